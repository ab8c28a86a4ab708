// Connection logic

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};

use crate::log::Logger;
use crate::rtmp::{make_swf_verification_response, rtmp_handshake, rtmp_make_connect_message};

use super::{RtmpLink, RtmpProtocol, RtmpSession, SessionReader};

/// A session over a plain TCP transport
pub type RtmpTcpSession = RtmpSession<OwnedReadHalf, OwnedWriteHalf>;

/// SOCKS4 success reply code
const SOCKS_REQUEST_GRANTED: u8 = 90;

/// Connects to the configured server and leaves the session ready
/// for connect_stream
///
/// Resolves the address (directly or via the SOCKS4 proxy), runs the
/// handshake and sends the connect invoke
/// link - Link parameters
/// logger - Session logger, owned by the new session
pub async fn rtmp_connect(link: RtmpLink, logger: Logger) -> Result<RtmpTcpSession, ()> {
    if link.hostname.is_empty() {
        logger.log_error("Cannot connect: no hostname configured");
        return Err(());
    }

    if link.protocol != RtmpProtocol::Rtmp {
        logger.log_error(&format!(
            "Cannot connect: protocol not supported: {}",
            link.protocol.as_str()
        ));
        return Err(());
    }

    link.log_params(&logger);

    let (connect_host, connect_port) = match &link.sockshost {
        Some(sockshost) => (sockshost.clone(), link.socksport),
        None => (link.hostname.clone(), link.port),
    };

    let addr = resolve_addr(&connect_host, connect_port, &logger).await?;

    let mut stream = match TcpStream::connect(addr).await {
        Ok(s) => s,
        Err(e) => {
            logger.log_error(&format!("Failed to connect socket: {}", e));
            return Err(());
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        logger.log_debug(&format!("Could not set TCP_NODELAY: {}", e));
    }

    if link.sockshost.is_some() {
        logger.log_debug("SOCKS negotiation");

        if socks_negotiate(&mut stream, &link, &logger).await.is_err() {
            logger.log_error("SOCKS negotiation failed");
            return Err(());
        }
    }

    let (read_half, write_half) = stream.into_split();

    let mut reader = SessionReader::new(read_half, link.timeout);
    let mut write_stream = write_half;

    logger.log_debug("Connected, handshaking");

    let server_sig = match rtmp_handshake(&mut reader, &mut write_stream, &logger).await {
        Ok(sig) => sig,
        Err(_) => {
            logger.log_error("Handshake failed");
            return Err(());
        }
    };

    logger.log_debug("Handshaked");

    let mut session = RtmpSession::new(link, reader, write_stream, logger);

    if let Some(swf_hash) = session.link.swf_hash {
        session.swf_verification_response = Some(make_swf_verification_response(
            &swf_hash,
            session.link.swf_size,
            &server_sig,
        ));
    }

    let mut connect_packet = rtmp_make_connect_message(&session.link);

    if session.send_rtmp(&mut connect_packet, true).await.is_err() {
        session.logger.log_error("RTMP connect failed");
        return Err(());
    }

    Ok(session)
}

/// Resolves a hostname, preferring IPv4 addresses
/// hostname - The hostname to resolve
/// port - The port for the resulting address
/// logger - Logger to report resolution errors
async fn resolve_addr(hostname: &str, port: u16, logger: &Logger) -> Result<SocketAddr, ()> {
    let addrs: Vec<SocketAddr> = match lookup_host((hostname, port)).await {
        Ok(iter) => iter.collect(),
        Err(e) => {
            logger.log_error(&format!(
                "Problem accessing the DNS (addr: {}): {}",
                hostname, e
            ));
            return Err(());
        }
    };

    let resolved = addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first());

    match resolved {
        Some(addr) => Ok(*addr),
        None => {
            logger.log_error(&format!("No addresses found for {}", hostname));
            Err(())
        }
    }
}

/// Builds the SOCKS4 connect request for a target
/// port - Target port
/// ip - Target IPv4 address octets
fn make_socks_request(port: u16, ip: [u8; 4]) -> [u8; 9] {
    [
        4, // SOCKS version
        1, // Connect command
        ((port >> 8) & 0xff) as u8,
        (port & 0xff) as u8,
        ip[0],
        ip[1],
        ip[2],
        ip[3],
        0, // Terminator (empty user id)
    ]
}

/// Negotiates the SOCKS4 tunnel towards the target server
/// stream - The socket connected to the proxy
/// link - Link parameters (carry the target host and port)
/// logger - Logger to report errors
async fn socks_negotiate(
    stream: &mut TcpStream,
    link: &RtmpLink,
    logger: &Logger,
) -> Result<(), ()> {
    let target = resolve_addr(&link.hostname, link.port, logger).await?;

    let target_ip = match target {
        SocketAddr::V4(v4) => v4.ip().octets(),
        SocketAddr::V6(_) => {
            logger.log_error("SOCKS4 requires an IPv4 target address");
            return Err(());
        }
    };

    let request = make_socks_request(link.port, target_ip);

    if let Err(e) = stream.write_all(&request).await {
        logger.log_error(&format!("Could not send SOCKS request: {}", e));
        return Err(());
    }

    let mut response = [0u8; 8];

    if let Err(e) = stream.read_exact(&mut response).await {
        logger.log_error(&format!("Could not read SOCKS response: {}", e));
        return Err(());
    }

    if response[0] == 0 && response[1] == SOCKS_REQUEST_GRANTED {
        Ok(())
    } else {
        logger.log_error(&format!("SOCKS returned error code {}", response[1]));
        Err(())
    }
}

// Tests
