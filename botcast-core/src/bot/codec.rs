//! Payload rendering and encoded buffer reuse.
//!
//! A multicast encodes its payload exactly once. The resulting
//! [`EncodedPayload`] is cheap to clone (the bytes are reference counted) and
//! every delivery task holds a clone. When the multicast is done the
//! dispatcher hands the payload back through [`PayloadCodec::release`],
//! which recycles the allocation once no clone is alive anymore.

use crate::entities::platform::{Channel, Message, Stamp, User};
use crate::message::ParseResult;
use botcast_sdk::objects::payload::{
    ChannelPayload, MessagePayload, StampCreated, UserPayload,
};
use botcast_sdk::objects::{BotEventKind, Envelope, EventPayload};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

const INITIAL_CAPACITY: usize = 1024;
const MAX_POOLED: usize = 64;
/// Buffers that grew past this are dropped instead of pooled.
const MAX_POOLED_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// An encoded event body shared by every recipient of one multicast.
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    kind: BotEventKind,
    event_time: OffsetDateTime,
    bytes: Bytes,
}

impl EncodedPayload {
    pub fn kind(&self) -> BotEventKind {
        self.kind
    }

    pub fn event_time(&self) -> OffsetDateTime {
        self.event_time
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecStats {
    pub encoded: u64,
    /// Releases that returned a buffer to the pool.
    pub recycled: u64,
    pub pooled: usize,
}

#[derive(Debug, Default)]
pub struct PayloadCodec {
    pool: Mutex<Vec<BytesMut>>,
    encoded: AtomicU64,
    recycled: AtomicU64,
}

impl PayloadCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode with the current time as `eventTime`.
    pub fn encode(&self, payload: &EventPayload) -> Result<EncodedPayload, CodecError> {
        self.encode_at(payload, OffsetDateTime::now_utc())
    }

    pub fn encode_at(
        &self,
        payload: &EventPayload,
        event_time: OffsetDateTime,
    ) -> Result<EncodedPayload, CodecError> {
        let mut buf = self.acquire();
        let envelope = Envelope {
            event_time,
            body: payload,
        };
        let mut writer = (&mut buf).writer();
        if let Err(e) = serde_json::to_writer(&mut writer, &envelope) {
            self.recycle(buf);
            return Err(e.into());
        }
        self.encoded.fetch_add(1, Ordering::Relaxed);
        Ok(EncodedPayload {
            kind: payload.kind(),
            event_time,
            bytes: buf.freeze(),
        })
    }

    /// Give the buffer back once the multicast is complete.
    ///
    /// The allocation is reused only if this was the last reference; a clone
    /// still held elsewhere keeps it alive and it is freed normally.
    pub fn release(&self, payload: EncodedPayload) {
        if let Ok(buf) = payload.bytes.try_into_mut() {
            self.recycle(buf);
        }
    }

    pub fn stats(&self) -> CodecStats {
        CodecStats {
            encoded: self.encoded.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            pooled: self.pool.lock().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }

    fn acquire(&self) -> BytesMut {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(INITIAL_CAPACITY))
    }

    fn recycle(&self, mut buf: BytesMut) {
        if buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < MAX_POOLED {
            pool.push(buf);
            self.recycled.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Missing users render as the zero user.
pub fn user_payload(user: Option<&User>) -> UserPayload {
    match user {
        Some(user) => UserPayload {
            id: user.id,
            name: user.name.clone(),
            display_name: user.response_display_name().to_string(),
            icon_id: user.icon_file_id,
            bot: user.bot,
        },
        None => UserPayload::default(),
    }
}

/// `path` is the channel path without the leading `#`.
pub fn channel_payload(channel: &Channel, path: &str, creator: Option<&User>) -> ChannelPayload {
    ChannelPayload {
        id: channel.id,
        name: channel.name.clone(),
        path: format!("#{path}"),
        parent_id: channel.parent_id.unwrap_or(Uuid::nil()),
        creator: user_payload(creator),
        created_at: channel.created_at,
        updated_at: channel.updated_at,
    }
}

pub fn message_payload(
    message: &Message,
    author: Option<&User>,
    parsed: &ParseResult,
) -> MessagePayload {
    MessagePayload {
        id: message.id,
        user: user_payload(author),
        channel_id: message.channel_id,
        text: message.text.clone(),
        plain_text: parsed.plain_text.clone(),
        embedded: parsed.embedded.clone(),
        created_at: message.created_at,
        updated_at: message.updated_at,
    }
}

pub fn stamp_payload(stamp: &Stamp, creator: Option<&User>) -> StampCreated {
    StampCreated {
        id: stamp.id,
        name: stamp.name.clone(),
        file_id: stamp.file_id,
        creator: user_payload(creator),
    }
}
