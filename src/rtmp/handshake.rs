// RTMP handshake utils

use byteorder::{BigEndian, ByteOrder};
use hmac::{Hmac, Mac};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::log::Logger;
use crate::session::{session_write_bytes, SessionReader};
use crate::{log_debug, log_warning};

use super::{rtmp_get_time, RTMP_SIG_SIZE, RTMP_VERSION, SWF_VERIFICATION_RESPONSE_SIZE};

/// Performs the plaintext version 3 handshake, as the client
/// read_stream - Buffered reader over the transport
/// write_stream - Transport write half
/// logger - Session logger
///
/// Returns the server signature (S1), needed to derive the SWF
/// verification response. No application data may be exchanged
/// before this completes; any failure is fatal.
pub async fn rtmp_handshake<TR: AsyncRead + Unpin, TW: AsyncWrite + Unpin>(
    read_stream: &mut SessionReader<TR>,
    write_stream: &mut TW,
    logger: &Logger,
) -> Result<Vec<u8>, ()> {
    // C0 + C1: version byte, uptime, 4 zero bytes, random fill

    let mut client_sig = vec![0u8; RTMP_SIG_SIZE + 1];

    client_sig[0] = RTMP_VERSION;

    BigEndian::write_u32(&mut client_sig[1..5], rtmp_get_time());

    let mut rng = StdRng::from_os_rng();
    rng.fill_bytes(&mut client_sig[9..]);

    if let Err(e) = session_write_bytes(write_stream, &client_sig).await {
        logger.log_error(&format!("Handshake failed: could not send C0/C1: {}", e));
        return Err(());
    }

    // S0: version byte, mismatches are tolerated

    let server_version = match read_stream.read_byte(logger).await {
        Ok(b) => b,
        Err(_) => {
            logger.log_error("Handshake failed: could not read S0");
            return Err(());
        }
    };

    log_debug!(
        logger,
        format!("Handshake: type answer: {:02x}", server_version)
    );

    if server_version != RTMP_VERSION {
        log_warning!(
            logger,
            format!(
                "Handshake: type mismatch: client sent {}, server answered {}",
                RTMP_VERSION, server_version
            )
        );
    }

    // S1: server signature

    let mut server_sig = vec![0u8; RTMP_SIG_SIZE];

    if read_stream.read_n(&mut server_sig, logger).await.is_err() {
        logger.log_error("Handshake failed: could not read S1");
        return Err(());
    }

    log_debug!(
        logger,
        format!(
            "Handshake: server uptime: {}",
            BigEndian::read_u32(&server_sig[0..4])
        )
    );
    log_debug!(
        logger,
        format!(
            "Handshake: FMS version: {}.{}.{}.{}",
            server_sig[4], server_sig[5], server_sig[6], server_sig[7]
        )
    );

    // C2: echo of the server signature

    if let Err(e) = session_write_bytes(write_stream, &server_sig).await {
        logger.log_error(&format!("Handshake failed: could not send C2: {}", e));
        return Err(());
    }

    // S2: the server's echo of our signature, mismatches are tolerated

    let mut response = vec![0u8; RTMP_SIG_SIZE];

    if read_stream.read_n(&mut response, logger).await.is_err() {
        logger.log_error("Handshake failed: could not read S2");
        return Err(());
    }

    if response != client_sig[1..] {
        log_warning!(logger, "Handshake: client signature does not match");
    }

    Ok(server_sig)
}

/// Calculates HMAC-SHA256
fn calc_hmac(message: &[u8], key: &[u8]) -> Vec<u8> {
    let mut mac: Hmac<Sha256> = Hmac::new_from_slice(key).expect("HMAC can take key of any size");

    mac.update(message);

    mac.finalize().into_bytes().to_vec()
}

/// Derives the SWF verification response from the handshake
/// swf_hash - SHA256 hash of the decompressed player SWF
/// swf_size - Size of the decompressed player SWF
/// server_sig - The server signature (S1)
///
/// The response is the hash keyed with the tail of the server
/// signature, prefixed by the size, and is sent back whenever the
/// server requests SWF verification
pub fn make_swf_verification_response(
    swf_hash: &[u8; 32],
    swf_size: u32,
    server_sig: &[u8],
) -> [u8; SWF_VERIFICATION_RESPONSE_SIZE] {
    let mut response = [0u8; SWF_VERIFICATION_RESPONSE_SIZE];

    response[0] = 0x01;
    response[1] = 0x01;

    BigEndian::write_u32(&mut response[2..6], swf_size);
    BigEndian::write_u32(&mut response[6..10], swf_size);

    let key = &server_sig[server_sig.len() - 32..];
    let digest = calc_hmac(swf_hash, key);

    response[10..].copy_from_slice(&digest);

    response
}

// Tests
