//! Realtime candidate synchronization client for Moyeo rooms.
//!
//! Users in a room nominate restaurants as candidates and vote on them. This crate keeps a
//! client-side optimistic mirror of favorites, candidates and votes, talks to the room's
//! STOMP broker over WebSocket and reconciles the broker's full-state snapshots with the
//! user's own recent removals (tombstones).

// layers
pub mod domain;
pub mod infrastructure;
pub mod usecase;

// command line front-end
pub mod cli;
