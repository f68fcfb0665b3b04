// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-side client for the manager socket.
//!
//! A worker job calls [`Client::start`] once on startup to learn which
//! learner to run, and [`Client::stop`] on clean exit. The server never
//! times a request out; workers that care about deadlines set one with
//! [`Client::with_timeout`] and retry — a duplicate `start` after an
//! undelivered reply is detected server-side and reported as an error.

use std::path::Path;
use std::time::Duration;

use stint_core::{JobId, LearnerName};
use thiserror::Error;
use tokio::net::{
    unix::{OwnedReadHalf, OwnedWriteHalf},
    UnixStream,
};

use crate::protocol::{self, ProtocolError, Reply, Request};

/// Errors from client requests
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out")]
    Timeout,

    /// The server refused the request; carries the server's message
    /// (duplicate claim, exhaustion, ...).
    #[error("{0}")]
    Server(String),

    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),
}

/// Request/reply client dialing the manager's endpoint.
pub struct Client {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    timeout: Option<Duration>,
}

impl Client {
    /// Connect to the manager's endpoint.
    pub async fn connect(endpoint: impl AsRef<Path>) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(endpoint.as_ref()).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader,
            writer,
            timeout: None,
        })
    }

    /// Set a per-request deadline. Without one, requests block until the
    /// server replies.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Claim a learner for a starting job. Returns the learner's name in
    /// the form used at init.
    pub async fn start(
        &mut self,
        job_id: &JobId,
        log_fname: &str,
        job_name: &str,
    ) -> Result<LearnerName, ClientError> {
        let request = Request::Start {
            job_id: job_id.clone(),
            log_fname: log_fname.to_string(),
            job_name: job_name.to_string(),
        };
        match self.request(&request).await? {
            Reply::Fname { fname } => Ok(fname),
            Reply::Error { message } => Err(ClientError::Server(message)),
            Reply::Null => Err(ClientError::UnexpectedReply("start")),
        }
    }

    /// Report a learner finished. Idempotent on the server side.
    pub async fn stop(&mut self, fname: &LearnerName) -> Result<(), ClientError> {
        let request = Request::Stop {
            fname: fname.clone(),
        };
        match self.request(&request).await? {
            Reply::Null => Ok(()),
            Reply::Error { message } => Err(ClientError::Server(message)),
            Reply::Fname { .. } => Err(ClientError::UnexpectedReply("stop")),
        }
    }

    async fn request(&mut self, request: &Request) -> Result<Reply, ClientError> {
        let data = protocol::encode(request)?;
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.roundtrip(data))
                .await
                .map_err(|_| ClientError::Timeout)?,
            None => self.roundtrip(data).await,
        }
    }

    async fn roundtrip(&mut self, data: Vec<u8>) -> Result<Reply, ClientError> {
        protocol::write_message(&mut self.writer, &data).await?;
        let bytes = protocol::read_message(&mut self.reader).await?;
        Ok(protocol::decode(&bytes)?)
    }
}
