// Copyright (c) 2026 the corun contributors
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::Error;
use crate::task::retry::retry;
use crate::task::sleep::sleep;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};

/// How long to cooperatively sleep between non-blocking syscall retries.
const POLL_BACKOFF_SECS: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A non-blocking TCP or UDP client wrapper (§6).
///
/// `connect`/`recv`/`send` retry their underlying non-blocking syscall,
/// cooperatively [`sleep`]ing a short backoff between attempts, rather than
/// blocking the single scheduler thread on an OS-level wait.
pub enum Socket {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl Socket {
    /// Connect once. For TCP this is a real connect; for UDP it binds an
    /// ephemeral local port and associates `addr` as the default peer so
    /// `send`/`recv` (not `send_to`/`recv_from`) can be used uniformly.
    pub async fn connect(protocol: Protocol, addr: SocketAddr) -> Result<Self, Error> {
        match protocol {
            Protocol::Tcp => {
                let stream = TcpStream::connect(addr).map_err(io_error)?;
                stream.set_nonblocking(true).map_err(io_error)?;
                Ok(Socket::Tcp(stream))
            }
            Protocol::Udp => {
                let local: SocketAddr = if addr.is_ipv4() {
                    "0.0.0.0:0".parse().unwrap()
                } else {
                    "[::]:0".parse().unwrap()
                };
                let socket = UdpSocket::bind(local).map_err(io_error)?;
                socket.connect(addr).map_err(io_error)?;
                socket.set_nonblocking(true).map_err(io_error)?;
                Ok(Socket::Udp(socket))
            }
        }
    }

    /// Connect with a bounded exponential-backoff reconnect loop, reusing
    /// the scheduler's [`retry`] combinator (§6).
    pub async fn connect_with_retry(
        protocol: Protocol,
        addr: SocketAddr,
        max_retries: u32,
        base_delay: f64,
        backoff: f64,
    ) -> Result<Self, Error> {
        retry(
            move || Self::connect(protocol, addr),
            max_retries,
            base_delay,
            backoff,
            None,
        )
        .await
    }

    pub async fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        loop {
            let result = match self {
                Socket::Tcp(s) => s.write(data),
                Socket::Udp(s) => s.send(data),
            };
            match result {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => sleep(POLL_BACKOFF_SECS).await,
                Err(e) => return Err(io_error(e)),
            }
        }
    }

    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        loop {
            let result = match self {
                Socket::Tcp(s) => s.read(buf),
                Socket::Udp(s) => s.recv(buf),
            };
            match result {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => sleep(POLL_BACKOFF_SECS).await,
                Err(e) => return Err(io_error(e)),
            }
        }
    }
}

fn io_error(err: std::io::Error) -> Error {
    Error::runtime(format!("socket error: {err}"))
}
