//! Wire protocol for botcast bot event webhooks.
//!
//! Bots receive platform events as HTTP `POST` requests. Every request
//! carries three protocol headers (see [`headers`]) and a JSON body whose
//! schema depends on the event kind (see [`objects::payload`]).
//!
//! Bot authors can use [`verify::IncomingEvent`] to authenticate and decode
//! a request in one step.

#![forbid(unsafe_code)]

pub mod headers;
pub mod objects;
pub mod verify;
