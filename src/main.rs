// Main

mod amf;
mod flv;
mod log;
mod rtmp;
mod session;
mod utils;

use flv::FlvWriter;
use log::{LogConfig, Logger};
use rtmp::RTMP_DEFAULT_BUFFER_MS;
use session::{rtmp_connect, RtmpLink};
use tokio::fs::File;
use utils::{get_env_string, get_env_u32};

/// Main function
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load .env
    let _ = dotenvy::dotenv();

    // Initialize logger

    let logger = Logger::new(LogConfig::from_env());

    // Print version

    const VERSION: &str = env!("CARGO_PKG_VERSION");

    logger.log_info(&format!("RTMP Client (Rust Implementation) ({VERSION})"));

    // Load configuration

    let link = match RtmpLink::load_from_env(&logger) {
        Ok(l) => l,
        Err(_) => {
            std::process::exit(1);
        }
    };

    let out_file = get_env_string("OUT_FILE", "out.flv");
    let buffer_ms = get_env_u32("RTMP_BUFFER_MS", RTMP_DEFAULT_BUFFER_MS);

    // Connect and negotiate the play session

    logger.log_info(&format!("Connecting to {}:{}", link.hostname, link.port));

    let mut session = match rtmp_connect(link, logger.make_child_logger("[SESSION] ")).await {
        Ok(s) => s,
        Err(_) => {
            logger.log_error("Could not connect to the server");
            std::process::exit(1);
        }
    };

    session.set_buffer_ms(buffer_ms);

    if !session.connect_stream(-5000.0, 0).await {
        logger.log_error("Could not establish the play session");
        std::process::exit(1);
    }

    // Write the incoming media to the FLV sink

    logger.log_info(&format!("Writing stream to {}", out_file));

    let file = match File::create(&out_file).await {
        Ok(f) => f,
        Err(e) => {
            logger.log_error(&format!("Could not create {}: {}", out_file, e));
            std::process::exit(1);
        }
    };

    let mut writer = FlvWriter::new(file);

    writer.write_header(true, true).await?;

    let mut packet_count: u64 = 0;
    let mut last_progress: i64 = 0;

    while let Some(packet) = session.next_media_packet().await {
        writer.write_packet(&packet).await?;

        packet_count = packet_count.wrapping_add(1);

        let duration = session.get_duration();

        if duration > 0.0 && packet.header.timestamp >= last_progress + 5000 {
            last_progress = packet.header.timestamp;

            let seconds = (packet.header.timestamp as f64) / 1000.0;
            let percent = (seconds * 100.0 / duration).min(100.0);

            logger.log_info(&format!("{:.1} sec ({:.1}%)", seconds, percent));
        }
    }

    if session.is_timedout() {
        logger.log_warning("Receive timed out, the download may be incomplete");
    }

    writer.flush().await?;

    logger.log_info(&format!("Done, {} media packets written", packet_count));

    // End of main

    Ok(())
}
