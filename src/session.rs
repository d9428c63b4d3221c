use std::fmt;
use std::time::Instant;

use rand::Rng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::config::Config;
use crate::counters::Counters;
use crate::error::{classify_read_error, DrainEnd, SessionError};
use crate::stats::SessionStats;

// =============================================================================
// Session State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    BurstSending,
    Draining,
    Closing,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::BurstSending => "burst-sending",
            SessionState::Draining => "draining",
            SessionState::Closing => "closing",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a session that reached `Done` left its connection.
#[derive(Debug)]
pub enum SessionOutcome {
    Closed,
    /// The caller decides how long an abandoned connection stays open.
    Abandoned(TcpStream),
}

/// Builds one burst line: `token` repeated `repeats` times plus `\n`.
pub fn payload_line(token: &str, repeats: u32) -> Vec<u8> {
    let mut line = token.repeat(repeats as usize).into_bytes();
    line.push(b'\n');
    line
}

// =============================================================================
// Session Driver
// =============================================================================

/// One simulated client: connect, maybe burst, drain, then close or abandon.
pub struct Session<'a, R> {
    worker: usize,
    iteration: u32,
    state: SessionState,
    config: &'a Config,
    counters: &'a Counters,
    stats: &'a SessionStats,
    rng: &'a mut R,
}

impl<'a, R: Rng> Session<'a, R> {
    pub fn new(
        worker: usize,
        iteration: u32,
        config: &'a Config,
        counters: &'a Counters,
        stats: &'a SessionStats,
        rng: &'a mut R,
    ) -> Self {
        Self {
            worker,
            iteration,
            state: SessionState::Connecting,
            config,
            counters,
            stats,
            rng,
        }
    }

    pub async fn run(mut self) -> Result<SessionOutcome, SessionError> {
        self.stats.record_started();

        let result = self.drive().await;
        if let Err(e) = &result {
            self.enter(SessionState::Failed);
            self.stats.record_failure(e);
            debug!(
                "Worker {} session {} failed: {}",
                self.worker, self.iteration, e
            );
        }
        result
    }

    async fn drive(&mut self) -> Result<SessionOutcome, SessionError> {
        let mut stream = self.connect().await?;
        self.config
            .pacing
            .pause(&mut *self.rng, self.config.think_time())
            .await;

        if self.rng.random_bool(self.config.burst_probability) {
            self.enter(SessionState::BurstSending);
            self.burst(&mut stream).await?;
        }

        self.enter(SessionState::Draining);
        let end = self.drain(&mut stream).await;
        self.stats.record_drain(end);
        match end {
            DrainEnd::Failed(kind) => debug!(
                "Worker {} session {} read error: {:?}",
                self.worker, self.iteration, kind
            ),
            _ => trace!(
                "Worker {} session {} drain ended: {:?}",
                self.worker,
                self.iteration,
                end
            ),
        }

        self.enter(SessionState::Closing);
        let outcome = self.close(stream).await;
        self.enter(SessionState::Done);
        Ok(outcome)
    }

    fn enter(&mut self, next: SessionState) {
        trace!(
            "Worker {} session {}: {} -> {}",
            self.worker,
            self.iteration,
            self.state,
            next
        );
        self.state = next;
    }

    async fn connect(&mut self) -> Result<TcpStream, SessionError> {
        let addr = self.config.target();
        let start = Instant::now();

        match timeout(self.config.connect_timeout(), TcpStream::connect(addr.as_str())).await {
            Ok(Ok(stream)) => {
                self.stats.record_connected(start.elapsed()).await;
                trace!("Worker {} connected to {}", self.worker, addr);
                Ok(stream)
            }
            Ok(Err(source)) => Err(SessionError::Connect { addr, source }),
            Err(_) => Err(SessionError::ConnectTimeout {
                addr,
                elapsed: start.elapsed(),
            }),
        }
    }

    async fn burst(&mut self, stream: &mut TcpStream) -> Result<(), SessionError> {
        let sends = self.config.burst_sends.sample(&mut *self.rng);

        for sent in 0..sends {
            let repeats = self.config.payload_repeats.sample(&mut *self.rng);
            let line = payload_line(&self.config.payload_token, repeats);

            match timeout(self.config.write_timeout(), stream.write_all(&line)).await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => return Err(SessionError::Write { sent, source }),
                Err(_) => return Err(SessionError::WriteTimeout { sent }),
            }

            self.config
                .pacing
                .pause(&mut *self.rng, self.config.send_pause())
                .await;
            self.counters.add_sent(line.len() as u64);
            self.counters.increment_send_count();
        }

        Ok(())
    }

    /// Reads whatever is available without ever parking on a silent peer.
    ///
    /// A zero idle window polls the socket with `try_read`; otherwise each
    /// read waits at most the idle window and a timeout counts as "no data".
    async fn drain(&mut self, stream: &mut TcpStream) -> DrainEnd {
        let mut buf = vec![0u8; self.config.read_chunk];
        let idle = self.config.read_idle();

        loop {
            let read = if idle.is_zero() {
                stream.try_read(&mut buf)
            } else {
                match timeout(idle, stream.read(&mut buf)).await {
                    Ok(read) => read,
                    Err(_) => return DrainEnd::Idle,
                }
            };

            match read {
                Ok(0) => return DrainEnd::PeerClosed,
                Ok(n) => {
                    self.counters.add_received(n as u64);
                    if self.rng.random_bool(self.config.early_exit_probability) {
                        return DrainEnd::EarlyExit;
                    }
                }
                Err(e) => return classify_read_error(&e),
            }
        }
    }

    async fn close(&mut self, mut stream: TcpStream) -> SessionOutcome {
        self.config
            .pacing
            .pause(&mut *self.rng, self.config.linger())
            .await;

        let close = self.rng.random_bool(self.config.close_probability);
        self.stats.record_close(close);
        if !close {
            return SessionOutcome::Abandoned(stream);
        }

        if let Err(e) = stream.shutdown().await {
            debug!("Worker {} shutdown error: {}", self.worker, e);
        }
        SessionOutcome::Closed
    }
}
