#![cfg(test)]
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the fake proxy answers every request it receives
#[derive(Clone)]
pub enum Behavior {
    /// Reply with a status line and body, then close
    Respond { status: u16, body: String },
    /// Accept the connection and never answer
    Silent,
    /// Read the request head, then close without a reply
    Hangup,
    /// After the first bytes arrive, write these bytes verbatim and close
    Raw(String),
}

/// Loopback HTTP proxy that answers forwarded requests itself, playing the echo service
pub struct FakeProxy {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeProxy {
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake proxy");
        let addr = listener.local_addr().expect("Fake proxy has no address");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(Self::handle_connection(socket, behavior.clone(), Arc::clone(&seen)));
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    /// Proxy line in `http://127.0.0.1:PORT` form
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Proxy line in `socks5://127.0.0.1:PORT` form
    pub fn socks5_url(&self) -> String {
        format!("socks5://{}", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Raw request heads received so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    async fn handle_connection(mut socket: TcpStream, behavior: Behavior, seen: Arc<Mutex<Vec<String>>>) {
        let mut head = Vec::new();
        let mut buffer = [0u8; 1024];

        // Non-HTTP clients (SOCKS greetings) never send a blank line
        if let Behavior::Raw(reply) = &behavior {
            if let Ok(n) = socket.read(&mut buffer).await {
                seen.lock().unwrap().push(String::from_utf8_lossy(&buffer[..n]).into_owned());
            }
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
            // wait for the client to hang up so unread bytes do not turn the close into a reset
            while let Ok(n) = socket.read(&mut buffer).await {
                if n == 0 {
                    break;
                }
            }
            return;
        }

        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buffer).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buffer[..n]),
            }
        }
        seen.lock().unwrap().push(String::from_utf8_lossy(&head).into_owned());

        match behavior {
            Behavior::Respond { status, body } => {
                let response = format!(
                    "HTTP/1.1 {} Fake\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
            Behavior::Silent => {
                // hold the socket open until the client gives up
                let _ = socket.read(&mut buffer).await;
            }
            Behavior::Hangup | Behavior::Raw(_) => drop(socket),
        }
    }
}

impl Drop for FakeProxy {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A loopback port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind probe port");
    let port = listener.local_addr().expect("No local address").port();
    drop(listener);
    port
}
