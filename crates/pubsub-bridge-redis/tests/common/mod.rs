//! A small RESP2 server that stands in for Redis.
//!
//! It answers PING, PUBLISH, SUBSCRIBE and AUTH, acknowledges everything else
//! with `+OK`, records every command it receives, and can push channel
//! messages to subscribed connections or drop all connections on demand.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum Push {
    Message { channel: String, payload: Vec<u8> },
    Close,
}

#[derive(Default)]
struct State {
    connections: AtomicUsize,
    commands: Mutex<Vec<Vec<String>>>,
    fail_ping: AtomicBool,
    fail_publish: AtomicBool,
}

pub struct FakeRedis {
    addr: SocketAddr,
    state: Arc<State>,
    pushes: broadcast::Sender<Push>,
    accept: JoinHandle<()>,
}

impl FakeRedis {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State::default());
        let (pushes, _) = broadcast::channel(16);

        let accept = {
            let state = state.clone();
            let pushes = pushes.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    state.connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve_connection(socket, state.clone(), pushes.subscribe()));
                }
            })
        };

        Self {
            addr,
            state,
            pushes,
            accept,
        }
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    pub fn url_with_password(&self, password: &str) -> String {
        format!("redis://:{password}@{}", self.addr)
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Received commands whose name matches `name`, arguments included.
    pub fn commands_named(&self, name: &str) -> Vec<Vec<String>> {
        self.state
            .commands
            .lock()
            .iter()
            .filter(|cmd| cmd.first().is_some_and(|c| c.eq_ignore_ascii_case(name)))
            .cloned()
            .collect()
    }

    pub fn fail_ping(&self, fail: bool) {
        self.state.fail_ping.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Deliver a message to every connection subscribed to `channel`.
    pub fn publish(&self, channel: &str, payload: &[u8]) {
        let _ = self.pushes.send(Push::Message {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Close every open connection from the server side.
    pub fn close_connections(&self) {
        let _ = self.pushes.send(Push::Close);
    }
}

impl Drop for FakeRedis {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn serve_connection(
    socket: TcpStream,
    state: Arc<State>,
    mut pushes: broadcast::Receiver<Push>,
) {
    let (read, mut write) = socket.into_split();
    let (commands, mut incoming) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut reader = BufReader::new(read);
        while let Ok(Some(cmd)) = read_command(&mut reader).await {
            if commands.send(cmd).is_err() {
                break;
            }
        }
    });

    let mut subscribed = HashSet::new();
    loop {
        tokio::select! {
            cmd = incoming.recv() => {
                let Some(cmd) = cmd else { return };
                let reply = reply_to(&state, &cmd, &mut subscribed);
                state.commands.lock().push(cmd);
                if write.write_all(&reply).await.is_err() {
                    return;
                }
            }
            push = pushes.recv() => match push {
                Ok(Push::Message { channel, payload }) if subscribed.contains(&channel) => {
                    let mut frame = b"*3\r\n".to_vec();
                    bulk(&mut frame, b"message");
                    bulk(&mut frame, channel.as_bytes());
                    bulk(&mut frame, &payload);
                    if write.write_all(&frame).await.is_err() {
                        return;
                    }
                }
                Ok(Push::Close) | Err(broadcast::error::RecvError::Closed) => return,
                _ => {}
            },
        }
    }
}

fn reply_to(state: &State, cmd: &[String], subscribed: &mut HashSet<String>) -> Vec<u8> {
    let name = cmd.first().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
    match name.as_str() {
        "PING" if state.fail_ping.load(Ordering::SeqCst) => b"-ERR ping refused\r\n".to_vec(),
        "PING" => b"+PONG\r\n".to_vec(),
        "PUBLISH" if state.fail_publish.load(Ordering::SeqCst) => {
            b"-ERR publish refused\r\n".to_vec()
        }
        "PUBLISH" => b":1\r\n".to_vec(),
        "SUBSCRIBE" => {
            let channel = cmd.get(1).cloned().unwrap_or_default();
            let mut frame = b"*3\r\n".to_vec();
            bulk(&mut frame, b"subscribe");
            bulk(&mut frame, channel.as_bytes());
            frame.extend_from_slice(format!(":{}\r\n", subscribed.len() + 1).as_bytes());
            subscribed.insert(channel);
            frame
        }
        _ => b"+OK\r\n".to_vec(),
    }
}

fn bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Read one command sent as an array of bulk strings.
async fn read_command<R>(reader: &mut R) -> std::io::Result<Option<Vec<String>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let count = header(&line, '*')?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await?;
        let len = header(&line, '$')?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Ok(Some(args))
}

fn header(line: &str, prefix: char) -> std::io::Result<usize> {
    line.trim_end()
        .strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("bad header {line:?}"))
        })
}
