//! Client session: guest authentication, room entry and the interactive prompt.

use std::{io::Write, sync::Arc};

use moyeo_shared::time::{Clock, SystemClock};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::{broadcast, mpsc};

use crate::{
    domain::{KeyValueStorage, RoomCode},
    infrastructure::{
        api::HttpBackend,
        storage::{InMemoryStorage, JsonFileStorage},
        transport::WebSocketTransport,
    },
    usecase::{
        GuestAuthSettings, GuestAuthenticator, LocalStateStore, RealtimeChannelClient,
        RoomController, RoomEvent, RoomServices, TombstoneLedger,
    },
};

use super::{command::Command, config::Args, error::CliError, formatter::CandidateFormatter};

/// Run the client until the user quits or stdin closes.
pub async fn run_client(args: Args) -> Result<(), CliError> {
    let room = args.room_code()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let backend = Arc::new(HttpBackend::new(args.api_url.clone()));
    let local: Arc<dyn KeyValueStorage> = Arc::new(JsonFileStorage::new(args.storage_path()));
    let session: Arc<dyn KeyValueStorage> = Arc::new(InMemoryStorage::new());

    let auth = GuestAuthenticator::new(
        backend.clone(),
        local.clone(),
        session,
        clock.clone(),
        GuestAuthSettings::default(),
    );
    let identity = auth.ensure_guest(&room).await?;
    backend
        .set_access_token(Some(identity.access_token.clone()))
        .await;
    tracing::info!(
        "Signed in as guest {} ({})",
        identity.user_id,
        identity.nickname.as_deref().unwrap_or("no nickname")
    );

    let store = Arc::new(LocalStateStore::new(
        backend.clone(),
        backend.clone(),
        local.clone(),
    ));
    store.load().await?;
    let channel = Arc::new(RealtimeChannelClient::new(
        Arc::new(WebSocketTransport::new(args.ws_url.clone())),
        args.channel_settings(&identity),
    ));
    let controller = Arc::new(RoomController::new(
        room.clone(),
        Some(identity.user_id),
        RoomServices {
            store,
            ledger: Arc::new(TombstoneLedger::new(local)),
            channel,
            places: backend.clone(),
            rooms: backend,
        },
    ));

    let events = controller.subscribe();
    controller.enter().await?;
    println!(
        "\nEntered room '{}'. Type 'help' for commands. Press Ctrl+C to exit.",
        room
    );
    print!(
        "{}",
        CandidateFormatter::format_candidates(&controller.candidates().await, clock.now_millis())
    );

    let printer = tokio::spawn(print_events(events, room.clone(), clock.clone()));
    let mut input_rx = spawn_readline(prompt(&room));

    while let Some(line) = input_rx.recv().await {
        let output = match Command::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(&controller, command, clock.as_ref()).await,
            Err(e) => CandidateFormatter::format_error(&e.to_string()),
        };
        print!("{}", output);
        flush_stdout();
    }

    printer.abort();
    controller.exit().await;
    println!("Left room '{}'.", room);
    Ok(())
}

async fn execute(controller: &RoomController, command: Command, clock: &dyn Clock) -> String {
    let result = match command {
        Command::Add(place_id) | Command::Remove(place_id) => {
            let wanted = matches!(command, Command::Add(_));
            let is_candidate = controller
                .candidates()
                .await
                .iter()
                .any(|c| c.id() == place_id);
            if is_candidate == wanted {
                let state = if wanted { "already" } else { "not" };
                return CandidateFormatter::format_error(&format!(
                    "{} is {} a candidate",
                    place_id, state
                ));
            }
            controller
                .toggle_candidate(place_id)
                .await
                .map(|now| CandidateFormatter::format_candidate_toggled(place_id, now))
        }
        Command::Vote(place_id) => controller
            .toggle_vote(place_id)
            .await
            .map(|now| CandidateFormatter::format_vote_toggled(place_id, now)),
        Command::Favorite(place_id) => controller
            .toggle_favorite(place_id)
            .await
            .map(|now| CandidateFormatter::format_favorite_toggled(place_id, now)),
        Command::Info(place_id) => controller
            .enrich_place(place_id)
            .await
            .map(|place| CandidateFormatter::format_place(&place)),
        Command::List => Ok(CandidateFormatter::format_candidates(
            &controller.candidates().await,
            clock.now_millis(),
        )),
        Command::Help => Ok(CandidateFormatter::format_help()),
        Command::Quit => Ok(String::new()),
    };
    result.unwrap_or_else(|e| {
        tracing::warn!("Command failed: {}", e);
        CandidateFormatter::format_error(&e.to_string())
    })
}

async fn print_events(
    mut events: broadcast::Receiver<RoomEvent>,
    room: RoomCode,
    clock: Arc<dyn Clock>,
) {
    loop {
        match events.recv().await {
            Ok(RoomEvent::CandidatesChanged(candidates)) => {
                print!(
                    "{}",
                    CandidateFormatter::format_candidates(&candidates, clock.now_millis())
                );
                redisplay_prompt(&room);
            }
            Ok(RoomEvent::PanelRequested(panel)) => {
                tracing::debug!("Panel requested: {:?}", panel);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Skipped {} room events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Read lines on a blocking thread; the receiver closes on Ctrl+C, Ctrl+D or a readline error.
fn spawn_readline(prompt: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };
        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line).ok();
                    if input_tx.send(line.to_string()).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });
    input_rx
}

fn prompt(room: &RoomCode) -> String {
    format!("{}> ", room)
}

fn redisplay_prompt(room: &RoomCode) {
    print!("{}", prompt(room));
    flush_stdout();
}

fn flush_stdout() {
    if let Err(e) = std::io::stdout().flush() {
        tracing::debug!("Failed to flush stdout: {}", e);
    }
}
