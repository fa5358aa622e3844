//! The single-threaded event loop: owns the listening socket, the connection
//! table, the timer heap, and a handle to the worker pool.
//!
//! Grounded on the teacher's `Listener` (`server/src/listener.rs`): a
//! `mio::Poll` plus a `Slab` of sessions, with a dedicated listener token and
//! an accept-until-`WouldBlock` loop. Generalized per the design: sessions are
//! `Arc<Mutex<Connection>>` (same shape as the teacher's `Mutex<TcpStream>`
//! inside `Session`) so a worker thread can safely drive one connection's
//! read/write while the reactor thread continues polling; workers report back
//! over a channel instead of mutating the table directly, woken promptly via
//! a `mio::Waker` rather than contending on a shared mutex.

use std::fs::File;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use mio::event::Event;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use slab::Slab;
use tracing::{debug, warn};

use crate::auth::UserVerifier;
use crate::connection::{Connection, Progress};
use crate::error::{RaskError, Result};
use crate::timer::TimerHeap;
use crate::worker_pool::WorkerPool;

const LISTENER_TOKEN: Token = Token(usize::MAX);
const WAKER_TOKEN: Token = Token(usize::MAX - 1);

// Linux errno for "too many open files"; there is no portable `ErrorKind`
// variant for this yet on stable.
const EMFILE: i32 = 24;

enum Command {
    Rearm(Token, Interest),
    Close(Token),
}

/// Owns the reactor's mutable state: the poller, the accepted-connection
/// table, the idle-connection timer heap, and the channel workers report
/// completed I/O over.
pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    connections: Slab<Arc<Mutex<Connection>>>,
    timers: TimerHeap,
    workers: WorkerPool,
    auth: Arc<dyn UserVerifier>,
    doc_root: PathBuf,
    keepalive_ms: u64,
    command_tx: Sender<Command>,
    command_rx: Receiver<Command>,
    waker: Arc<Waker>,
    spare_fd: Option<File>,
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("open_connections", &self.connections.len())
            .field("pending_timers", &self.timers.len())
            .finish()
    }
}

impl Reactor {
    /// Binds the listening socket and wires up the worker pool. Does not
    /// start serving until [`Reactor::run`] is called.
    pub fn new(
        addr: SocketAddr,
        thread_num: usize,
        doc_root: PathBuf,
        auth: Arc<dyn UserVerifier>,
        keepalive_ms: u64,
    ) -> Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let (command_tx, command_rx) = unbounded();

        Ok(Reactor {
            poll,
            listener,
            connections: Slab::new(),
            timers: TimerHeap::new(),
            workers: WorkerPool::new(thread_num),
            auth,
            doc_root,
            keepalive_ms,
            command_tx,
            command_rx,
            waker,
            // Reserved so an EMFILE accept failure can be worked around by
            // freeing one fd, accepting and immediately dropping the pending
            // connection, then reopening the spare.
            spare_fd: File::open("/dev/null").ok(),
        })
    }

    /// Runs the event loop. Blocks until the poller itself returns a fatal
    /// (non-`Interrupted`) error.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(1024);
        loop {
            self.drain_commands();
            let next_tick_ms = self.timers.get_next_tick();
            // `get_next_tick` may have invoked expired idle-timer callbacks,
            // which enqueue `Command::Close`; pick those up before blocking.
            self.drain_commands();

            let timeout = if next_tick_ms < 0 {
                None
            } else {
                Some(Duration::from_millis(next_tick_ms as u64))
            };

            match self.poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(RaskError::from(e)),
            }

            for event in events.iter() {
                self.dispatch(event);
            }
            self.drain_commands();
        }
    }

    fn dispatch(&mut self, event: &Event) {
        let token = event.token();
        if token == LISTENER_TOKEN {
            self.accept();
            return;
        }
        if token == WAKER_TOKEN {
            return;
        }

        let Some(conn) = self.connections.get(token.0).cloned() else {
            return;
        };

        if event.is_error() || (event.is_read_closed() && event.is_write_closed()) {
            self.close(token);
            return;
        }

        if event.is_readable() {
            let _ = self.timers.adjust(token.0 as i32, self.keepalive_ms);
            self.submit_read(token, conn.clone());
        }
        if event.is_writable() {
            self.submit_write(token, conn);
        }
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => self.register_connection(stream),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.raw_os_error() == Some(EMFILE) => self.handle_emfile(),
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn handle_emfile(&mut self) {
        warn!("EMFILE on accept; freeing spare fd to drain one pending connection");
        self.spare_fd.take();
        if let Ok((stream, _addr)) = self.listener.accept() {
            drop(stream);
        }
        self.spare_fd = File::open("/dev/null").ok();
    }

    fn register_connection(&mut self, stream: mio::net::TcpStream) {
        let entry = self.connections.vacant_entry();
        let token = Token(entry.key());
        let mut conn = Connection::new(token, stream);
        if let Err(e) = conn.register(self.poll.registry()) {
            warn!(error = %e, "failed to register accepted connection");
            return;
        }

        let tx = self.command_tx.clone();
        self.timers.add(token.0 as i32, self.keepalive_ms, {
            let waker = self.waker.clone();
            Box::new(move || {
                let _ = tx.send(Command::Close(token));
                let _ = waker.wake();
            })
        });
        entry.insert(Arc::new(Mutex::new(conn)));
    }

    fn submit_read(&self, token: Token, conn: Arc<Mutex<Connection>>) {
        let tx = self.command_tx.clone();
        let waker = self.waker.clone();
        let doc_root = self.doc_root.clone();
        let auth = self.auth.clone();
        if self
            .workers
            .submit(Box::new(move || {
                let mut guard = conn.lock().unwrap();
                let cmd = do_read(&mut guard, &doc_root, auth.as_ref());
                drop(guard);
                if let Some(cmd) = cmd {
                    let _ = tx.send(cmd);
                    let _ = waker.wake();
                }
            }))
            .is_err()
        {
            warn!(token = token.0, "worker pool unavailable; closing connection");
        }
    }

    fn submit_write(&self, token: Token, conn: Arc<Mutex<Connection>>) {
        let tx = self.command_tx.clone();
        let waker = self.waker.clone();
        if self
            .workers
            .submit(Box::new(move || {
                let mut guard = conn.lock().unwrap();
                let cmd = do_write(&mut guard);
                drop(guard);
                if let Some(cmd) = cmd {
                    let _ = tx.send(cmd);
                    let _ = waker.wake();
                }
            }))
            .is_err()
        {
            warn!(token = token.0, "worker pool unavailable; closing connection");
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            match cmd {
                Command::Rearm(token, interest) => self.rearm(token, interest),
                Command::Close(token) => self.close(token),
            }
        }
    }

    fn rearm(&mut self, token: Token, interest: Interest) {
        let Some(conn) = self.connections.get(token.0) else {
            return;
        };
        let mut guard = conn.lock().unwrap();
        if guard.reregister(self.poll.registry(), interest).is_err() {
            drop(guard);
            self.close(token);
        }
    }

    fn close(&mut self, token: Token) {
        if !self.connections.contains(token.0) {
            return;
        }
        let conn = self.connections.remove(token.0);
        let mut guard = conn.lock().unwrap();
        guard.close(self.poll.registry());
        drop(guard);
        self.timers.cancel(token.0 as i32);
        debug!(token = token.0, "connection closed");
    }
}

/// Runs on a worker thread: drains the readable socket, then attempts to
/// parse a full request. Returns the command the reactor should apply, or
/// `None` if the connection needs no reactor-side change (still waiting on
/// more bytes).
fn do_read(conn: &mut Connection, doc_root: &PathBuf, auth: &dyn UserVerifier) -> Option<Command> {
    let token = conn.token();
    match conn.read() {
        Ok(Progress::Closed) => return Some(Command::Close(token)),
        Err(_) => return Some(Command::Close(token)),
        Ok(_) => {}
    }

    match conn.process(doc_root, auth) {
        Ok(Progress::ResponseReady) => Some(Command::Rearm(token, Interest::WRITABLE)),
        Ok(_) => None,
        Err(_) => Some(Command::Close(token)),
    }
}

/// Runs on a worker thread: drains the out-buffer. Returns the command the
/// reactor should apply.
fn do_write(conn: &mut Connection) -> Option<Command> {
    let token = conn.token();
    match conn.write() {
        Ok(Progress::Flushed { keep_alive: true }) => {
            conn.reinit();
            Some(Command::Rearm(token, Interest::READABLE))
        }
        Ok(Progress::Flushed { keep_alive: false }) => Some(Command::Close(token)),
        Ok(_) => None,
        Err(_) => Some(Command::Close(token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryUserVerifier;
    use std::io::{Read, Write};
    use std::net::TcpStream as StdTcpStream;
    use std::thread;

    #[test]
    fn serves_a_request_end_to_end() {
        let mut reactor = Reactor::new(
            "127.0.0.1:0".parse().unwrap(),
            2,
            std::env::temp_dir(),
            Arc::new(InMemoryUserVerifier::default()),
            60_000,
        )
        .unwrap();
        let addr = reactor.listener.local_addr().unwrap();

        let index = std::env::temp_dir().join("rask-reactor-test-index.html");
        std::fs::write(&index, b"hi").unwrap();

        let handle = thread::spawn(move || {
            let _ = reactor.run();
        });

        let mut client = StdTcpStream::connect(addr).unwrap();
        client
            .write_all(b"GET /rask-reactor-test-index.html HTTP/1.1\r\nConnection: close\r\n\r\n")
            .unwrap();

        let mut response = Vec::new();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let _ = client.read_to_end(&mut response);
        let rendered = String::from_utf8_lossy(&response);
        assert!(rendered.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(rendered.ends_with("hi"));

        let _ = std::fs::remove_file(&index);
        // The reactor thread runs its event loop forever; this test process
        // exits without joining it, which is fine for a one-shot assertion.
        drop(handle);
    }
}
