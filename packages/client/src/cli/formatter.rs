//! Text formatting for the prompt output.

use moyeo_shared::time::timestamp_to_kst_rfc3339;

use crate::domain::{Place, PlaceCandidate, PlaceId};

const RULE: &str = "============================================================";

pub struct CandidateFormatter;

impl CandidateFormatter {
    /// Format the reconciled candidate list
    ///
    /// # Arguments
    ///
    /// * `candidates` - Candidates in display order
    /// * `at` - Unix timestamp of the update (milliseconds)
    pub fn format_candidates(candidates: &[PlaceCandidate], at: i64) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n\n{}\n", RULE));
        output.push_str(&format!(
            "Candidates ({}) as of {}:\n",
            candidates.len(),
            timestamp_to_kst_rfc3339(at)
        ));
        if candidates.is_empty() {
            output.push_str("(No candidates)\n");
        }
        for candidate in candidates {
            let mine = if candidate.voted_by_current_user {
                " (voted)"
            } else {
                ""
            };
            output.push_str(&format!(
                "[{}] {}{} - {} vote(s){}\n",
                candidate.id(),
                candidate.place.name,
                category_suffix(&candidate.place),
                candidate.vote_count,
                mine
            ));
        }
        output.push_str(RULE);
        output.push('\n');
        output
    }

    pub fn format_candidate_toggled(place_id: PlaceId, now_candidate: bool) -> String {
        if now_candidate {
            format!("+ nominated {}\n", place_id)
        } else {
            format!("- withdrew {}\n", place_id)
        }
    }

    pub fn format_vote_toggled(place_id: PlaceId, now_voted: bool) -> String {
        if now_voted {
            format!("+ voted for {}\n", place_id)
        } else {
            format!("- took back vote on {}\n", place_id)
        }
    }

    pub fn format_favorite_toggled(place_id: PlaceId, now_favorite: bool) -> String {
        if now_favorite {
            format!("* {} added to favorites\n", place_id)
        } else {
            format!("* {} removed from favorites\n", place_id)
        }
    }

    pub fn format_place(place: &Place) -> String {
        let mut output = format!("[{}] {}{}\n", place.id, place.name, category_suffix(place));
        if let Some(address) = &place.address {
            output.push_str(&format!("    {}\n", address));
        }
        if place.coordinates.is_valid() {
            output.push_str(&format!(
                "    ({:.6}, {:.6})\n",
                place.coordinates.latitude, place.coordinates.longitude
            ));
        }
        output
    }

    pub fn format_error(message: &str) -> String {
        format!("! {}\n", message)
    }

    pub fn format_help() -> String {
        [
            "Commands:",
            "  add <placeId>     nominate a place",
            "  remove <placeId>  withdraw a nomination",
            "  vote <placeId>    vote / take back a vote",
            "  fav <placeId>     favorite / unfavorite",
            "  info <placeId>    show place details",
            "  list              show candidates",
            "  quit              leave the room",
            "",
        ]
        .join("\n")
    }
}

fn category_suffix(place: &Place) -> String {
    place
        .category
        .as_deref()
        .map(|category| format!(" <{}>", category))
        .unwrap_or_default()
}
