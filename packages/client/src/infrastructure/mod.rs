//! Infrastructure layer: concrete implementations of the domain interfaces and the wire
//! formats they speak.

pub mod api;
pub mod dto;
pub mod stomp;
pub mod storage;
pub mod transport;
