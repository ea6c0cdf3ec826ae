// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codec seam.
//!
//! Codecs translate between a wire payload and its structured form. The
//! runtime only defines the interface and a name registry; actual codecs
//! are plugins supplied by the embedding Test Executable.

use crate::error::{TcError, TcResult};
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A message codec.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> TcResult<Value>;
    fn decode(&self, payload: &Value) -> TcResult<Value>;
}

/// Name -> codec table.
#[derive(Default, Clone)]
pub struct CodecRegistry {
    codecs: Arc<RwLock<HashMap<String, Arc<dyn Codec>>>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, codec: Arc<dyn Codec>) {
        self.codecs.write().insert(name.into(), codec);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.read().get(name).cloned()
    }

    pub fn encode(&self, name: &str, value: &Value) -> TcResult<Value> {
        let codec = self.get(name).ok_or_else(|| TcError::Codec {
            codec: name.to_string(),
            message: "codec not found".to_string(),
        })?;
        codec.encode(value)
    }

    pub fn decode(&self, name: &str, payload: &Value) -> TcResult<Value> {
        let codec = self.get(name).ok_or_else(|| TcError::Codec {
            codec: name.to_string(),
            message: "codec not found".to_string(),
        })?;
        codec.decode(payload)
    }
}
