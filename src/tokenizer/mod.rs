//! Streaming tokenizer
//!
//! Recognizes multi-character tokens spanning arbitrary fragment boundaries
//! from a live character stream. Each character arrives with an opaque payload
//! that is carried through matching and handed back, in order, with the token
//! it belongs to.
//!
//! A token boundary is only committed once enough trailing context has
//! arrived: a candidate match is accepted when another full alternative
//! matches flush against its end, or when the candidate ends exactly at
//! end-of-input. "helloworld" therefore splits into "hello" + "world" only
//! once "world" is confirmed, while a trailing "hello" is accepted as a
//! complete token at `flush()`.
//!
//! Scanning runs on a dedicated worker thread fed through a bounded blocking
//! channel, so `input()` applies backpressure instead of buffering without
//! limit. The handler runs on the worker side and must be `Send`.

pub mod definition;

pub use definition::TokenDefinition;

use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread;

use regex::Regex;
use tracing::warn;

use crate::error::{Error, Result};

/// How many pending commands the producer may queue before `input()` blocks.
const CHANNEL_BOUND: usize = 64;

/// Upper bound, in bytes, on buffered input that is not part of a pending
/// candidate. Token-free streams would otherwise grow the buffer and payload
/// queue without limit until `flush()`. Tokens longer than this are not
/// recognized across a trim.
const MAX_PENDING: usize = 64 * 1024;

/// A recognized token together with the payloads of exactly the characters
/// it consumed, dequeued FIFO. Ephemeral: handed to the handler and dropped.
#[derive(Debug)]
pub struct TokenMatch<P> {
    pub text: String,
    pub payloads: Vec<P>,
    pub definition: TokenDefinition,
}

/// Callback receiving each recognized token, invoked on the worker thread.
pub type TokenHandler<P> = Box<dyn FnMut(TokenMatch<P>) + Send>;

enum Command<P> {
    Input(String, Vec<P>),
    SetHandler(Option<TokenHandler<P>>),
    Flush(mpsc::SyncSender<()>),
}

/// Incremental token-boundary scanner over a fixed set of [`TokenDefinition`]s.
pub struct StreamingTokenizer<P: Send + 'static> {
    tx: Option<mpsc::SyncSender<Command<P>>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl<P: Send + 'static> StreamingTokenizer<P> {
    /// Build a tokenizer from an ordered, non-empty set of definitions.
    /// Earlier definitions win when more than one alternative matches at the
    /// same position.
    pub fn new(definitions: Vec<TokenDefinition>) -> Result<Self> {
        let scanner = Scanner::new(definitions)?;
        let (tx, rx) = mpsc::sync_channel(CHANNEL_BOUND);
        let worker = thread::Builder::new()
            .name("pdfveil-tokenizer".into())
            .spawn(move || run_worker(scanner, rx))?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Feed characters and their payloads into the scanning pipeline.
    ///
    /// Fails without mutating the payload queue if the character count of
    /// `text` differs from `payloads.len()`. Blocks briefly when the internal
    /// channel is full.
    pub fn input(&self, text: impl Into<String>, payloads: Vec<P>) -> Result<()> {
        let text = text.into();
        let chars = text.chars().count();
        if chars != payloads.len() {
            return Err(Error::InvalidArgument(format!(
                "input text has {} characters but {} payloads were supplied",
                chars,
                payloads.len()
            )));
        }
        self.send(Command::Input(text, payloads))
    }

    /// Replace the active handler; `None` installs a no-op. Takes effect for
    /// matches reported after the commands already queued ahead of it.
    pub fn set_handler(&self, handler: Option<TokenHandler<P>>) -> Result<()> {
        self.send(Command::SetHandler(handler))
    }

    /// Resolve buffered partial matches against end-of-input, emit the
    /// remaining tokens and re-arm the pipeline as if freshly constructed.
    /// Returns once every pending emission has been delivered.
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = mpsc::sync_channel(0);
        self.send(Command::Flush(ack_tx))?;
        ack_rx.recv().map_err(|_| Error::TokenizerClosed)
    }

    /// Terminate the scanning pipeline and wait for the worker to finish.
    /// Buffered partials are discarded; call [`flush`](Self::flush) first if
    /// they should be resolved. `input()` after `close()` fails.
    pub fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("tokenizer worker terminated abnormally");
            }
        }
    }

    fn send(&self, command: Command<P>) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::TokenizerClosed)?;
        tx.send(command).map_err(|_| Error::TokenizerClosed)
    }
}

impl<P: Send + 'static> Drop for StreamingTokenizer<P> {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker<P: Send>(mut scanner: Scanner<P>, rx: mpsc::Receiver<Command<P>>) {
    while let Ok(command) = rx.recv() {
        match command {
            Command::Input(text, payloads) => {
                scanner.feed(&text, payloads);
                scanner.scan(false);
            }
            Command::SetHandler(handler) => scanner.handler = handler,
            Command::Flush(ack) => {
                scanner.scan(true);
                scanner.rearm();
                let _ = ack.send(());
            }
        }
    }
}

/// Consumer-side state: the character buffer, the payload queue correlated
/// with it char-for-char, the combined alternation, and one anchored regex
/// per definition for re-searching alternatives at a fixed start.
struct Scanner<P> {
    definitions: Vec<TokenDefinition>,
    combined: Regex,
    anchored: Vec<Regex>,
    buf: String,
    payloads: VecDeque<P>,
    handler: Option<TokenHandler<P>>,
}

impl<P> Scanner<P> {
    fn new(definitions: Vec<TokenDefinition>) -> Result<Self> {
        if definitions.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one token definition is required".into(),
            ));
        }
        let alternation = definitions
            .iter()
            .enumerate()
            .map(|(i, d)| format!("(?P<d{}>{})", i, d.pattern()))
            .collect::<Vec<_>>()
            .join("|");
        let combined = Regex::new(&alternation).map_err(|e| {
            Error::InvalidArgument(format!("combined token pattern: {}", e))
        })?;
        let anchored = definitions
            .iter()
            .map(|d| {
                Regex::new(&format!("^(?:{})", d.pattern())).map_err(|e| {
                    Error::InvalidArgument(format!(
                        "token definition '{}': {}",
                        d.id(),
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            definitions,
            combined,
            anchored,
            buf: String::new(),
            payloads: VecDeque::new(),
            handler: None,
        })
    }

    fn feed(&mut self, text: &str, payloads: Vec<P>) {
        self.buf.push_str(text);
        self.payloads.extend(payloads);
    }

    fn rearm(&mut self) {
        self.buf.clear();
        self.payloads.clear();
    }

    /// Emit every committable token in the buffer.
    ///
    /// The engine has no lookahead, so the trailing-context rule is applied
    /// here: a candidate `[s, e)` commits when a follower alternative matches
    /// anchored at `e` without itself touching the unfinished buffer end, or
    /// when the candidate ends flush with the input at end-of-input. Spans
    /// that never satisfy the rule are absorbed silently.
    fn scan(&mut self, at_end: bool) {
        let mut committed = 0usize;
        let mut search = 0usize;
        // earliest byte a deferred candidate still needs
        let mut holdback: Option<usize> = None;
        loop {
            let candidate = self.combined.captures_at(&self.buf, search).and_then(|caps| {
                let m = caps.get(0)?;
                let index = (0..self.definitions.len())
                    .find(|i| caps.name(&format!("d{}", i)).is_some())
                    .unwrap_or(0);
                Some((m.start(), m.end(), index))
            });
            let (s, e, index) = match candidate {
                Some(found) => found,
                None => break,
            };

            // zero-width matches can never be tokens
            if e == s {
                if s >= self.buf.len() {
                    break;
                }
                search = s + next_char_len(&self.buf, s);
                continue;
            }

            if e == self.buf.len() {
                if at_end {
                    committed = self.emit(committed, s, e, index);
                    search = e;
                    continue;
                }
                // candidate may still grow
                holdback = Some(s);
                break;
            }

            match self.combined.find_at(&self.buf, e) {
                Some(f) if f.start() == e && (at_end || f.end() < self.buf.len()) => {
                    committed = self.emit(committed, s, e, index);
                    search = e;
                }
                Some(f) if f.start() == e => {
                    // follower touches the unfinished end and may still grow
                    holdback = Some(s);
                    break;
                }
                _ if at_end => {
                    // the preferred alternative has no confirming follower;
                    // backtrack to the other alternatives at this start
                    if let Some((alt_end, alt_index)) = self.alternative_at(s, e) {
                        committed = self.emit(committed, s, alt_end, alt_index);
                        search = alt_end;
                    } else {
                        search = s + next_char_len(&self.buf, s);
                    }
                }
                _ => {
                    // confirmation may arrive with more input
                    holdback = Some(s);
                    break;
                }
            }
        }

        if at_end {
            self.rearm();
            return;
        }
        if committed > 0 {
            let remainder = self.buf.split_off(committed);
            self.buf = remainder;
        }
        let floor = holdback.map_or(self.buf.len(), |held| held - committed);
        let mut cut = self.buf.len().saturating_sub(MAX_PENDING).min(floor);
        while cut > 0 && !self.buf.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut > 0 {
            let dropped = self.buf[..cut].chars().count();
            for _ in 0..dropped {
                self.payloads.pop_front();
            }
            let remainder = self.buf.split_off(cut);
            self.buf = remainder;
            warn!(dropped, "pending buffer exceeded cap, dropped unmatched prefix");
        }
    }

    /// In definition order, the first alternative matching exactly at `s`
    /// whose end satisfies the boundary rule against end-of-input, skipping
    /// the end that already failed it.
    fn alternative_at(&self, s: usize, failed_end: usize) -> Option<(usize, usize)> {
        for (index, re) in self.anchored.iter().enumerate() {
            let m = match re.find(&self.buf[s..]) {
                Some(m) if m.start() == 0 && m.end() > 0 => m,
                _ => continue,
            };
            let e = s + m.end();
            if e == failed_end {
                continue;
            }
            if e == self.buf.len() {
                return Some((e, index));
            }
            if let Some(f) = self.combined.find_at(&self.buf, e) {
                if f.start() == e {
                    return Some((e, index));
                }
            }
        }
        None
    }

    /// Deliver the token at byte range `[s, e)`, dropping the payloads of any
    /// absorbed characters between `committed` and `s`. Payload removal is
    /// atomic with emission; returns the new committed offset.
    fn emit(&mut self, committed: usize, s: usize, e: usize, index: usize) -> usize {
        let absorbed = self.buf[committed..s].chars().count();
        for _ in 0..absorbed {
            self.payloads.pop_front();
        }
        let len = self.buf[s..e].chars().count();
        let mut payloads = Vec::with_capacity(len);
        for _ in 0..len {
            if let Some(payload) = self.payloads.pop_front() {
                payloads.push(payload);
            }
        }
        let token = TokenMatch {
            text: self.buf[s..e].to_string(),
            payloads,
            definition: self.definitions[index].clone(),
        };
        if let Some(handler) = self.handler.as_mut() {
            handler(token);
        }
        e
    }
}

fn next_char_len(text: &str, at: usize) -> usize {
    text[at..].chars().next().map_or(1, |c| c.len_utf8())
}
