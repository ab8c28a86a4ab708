// Link parameters

use url::Url;

use crate::log::Logger;
use crate::rtmp::{RTMP_DEFAULT_PORT, SOCKS_DEFAULT_PORT};
use crate::utils::{get_env_bool, get_env_f64, get_env_string, get_env_u32};

/// Default flash player version reported to the server
pub const DEFAULT_FLASH_VER: &str = "LNX 10,0,32,18";

/// Default receive timeout (seconds)
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 120;

/// Default audio codec capability mask reported on connect
pub const DEFAULT_AUDIO_CODECS: f64 = 3191.0;

/// Default video codec capability mask reported on connect
pub const DEFAULT_VIDEO_CODECS: f64 = 252.0;

/// Protocol requested by the stream URL
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum RtmpProtocol {
    Rtmp,
    Rtmpt,
    Rtmps,
    Rtmpe,
    Rtmpte,
    Rtmfp,
}

impl RtmpProtocol {
    /// Parses the protocol from a URL scheme
    pub fn from_scheme(scheme: &str) -> Option<RtmpProtocol> {
        match scheme.to_lowercase().as_str() {
            "rtmp" => Some(RtmpProtocol::Rtmp),
            "rtmpt" => Some(RtmpProtocol::Rtmpt),
            "rtmps" => Some(RtmpProtocol::Rtmps),
            "rtmpe" => Some(RtmpProtocol::Rtmpe),
            "rtmpte" => Some(RtmpProtocol::Rtmpte),
            "rtmfp" => Some(RtmpProtocol::Rtmfp),
            _ => None,
        }
    }

    /// Returns the name of the protocol
    pub fn as_str(&self) -> &'static str {
        match self {
            RtmpProtocol::Rtmp => "RTMP",
            RtmpProtocol::Rtmpt => "RTMPT",
            RtmpProtocol::Rtmps => "RTMPS",
            RtmpProtocol::Rtmpe => "RTMPE",
            RtmpProtocol::Rtmpte => "RTMPTE",
            RtmpProtocol::Rtmfp => "RTMFP",
        }
    }
}

/// Parameters of the link to the remote server
/// Immutable once the session is set up
#[derive(Clone)]
pub struct RtmpLink {
    /// Protocol kind (only plain RTMP is supported)
    pub protocol: RtmpProtocol,

    /// Server hostname
    pub hostname: String,

    /// Server port
    pub port: u16,

    /// SOCKS4 proxy host, if the connection must be tunneled
    pub sockshost: Option<String>,

    /// SOCKS4 proxy port
    pub socksport: u16,

    /// Application name
    pub app: String,

    /// Path of the stream to play
    pub playpath: String,

    /// Connection URL reported to the server
    pub tc_url: String,

    /// URL of the player SWF
    pub swf_url: String,

    /// URL of the embedding web page
    pub page_url: String,

    /// Flash player version string
    pub flash_ver: String,

    /// Auth string appended to the connect command
    pub auth: String,

    /// Path for the FCSubscribe command
    pub subscribepath: String,

    /// Seek offset (milliseconds)
    pub seek_time: f64,

    /// Requested play duration (milliseconds), 0 to play to the end
    pub length: u32,

    /// True when requesting a live stream
    pub live: bool,

    /// Receive timeout (seconds)
    pub timeout: u32,

    /// Audio codec capability mask
    pub audio_codecs: f64,

    /// Video codec capability mask
    pub video_codecs: f64,

    /// SHA256 hash of the decompressed player SWF, for SWF verification
    pub swf_hash: Option<[u8; 32]>,

    /// Size of the decompressed player SWF
    pub swf_size: u32,
}

impl RtmpLink {
    /// Creates blank link parameters
    pub fn new_blank() -> RtmpLink {
        RtmpLink {
            protocol: RtmpProtocol::Rtmp,
            hostname: "".to_string(),
            port: RTMP_DEFAULT_PORT,
            sockshost: None,
            socksport: SOCKS_DEFAULT_PORT,
            app: "".to_string(),
            playpath: "".to_string(),
            tc_url: "".to_string(),
            swf_url: "".to_string(),
            page_url: "".to_string(),
            flash_ver: DEFAULT_FLASH_VER.to_string(),
            auth: "".to_string(),
            subscribepath: "".to_string(),
            seek_time: 0.0,
            length: 0,
            live: false,
            timeout: DEFAULT_TIMEOUT_SECONDS,
            audio_codecs: DEFAULT_AUDIO_CODECS,
            video_codecs: DEFAULT_VIDEO_CODECS,
            swf_hash: None,
            swf_size: 0,
        }
    }

    /// Loads the link parameters from the environment variables
    /// logger - Logger to report configuration errors
    pub fn load_from_env(logger: &Logger) -> Result<RtmpLink, ()> {
        let mut link = RtmpLink::new_blank();

        let url_str = get_env_string("RTMP_URL", "");

        if !url_str.is_empty() {
            link.apply_url(&url_str, logger)?;
        }

        let hostname = get_env_string("RTMP_HOST", &link.hostname);

        if hostname.is_empty() {
            logger.log_error("You must provide a hostname, set RTMP_URL or RTMP_HOST");
            return Err(());
        }

        link.hostname = hostname;

        let port = get_env_u32("RTMP_PORT", link.port as u32);

        if port > 65535 {
            logger.log_error(&format!("Invalid port: {}", port));
            return Err(());
        }

        // Port 0 selects the default RTMP port
        link.port = if port == 0 {
            RTMP_DEFAULT_PORT
        } else {
            port as u16
        };

        link.app = get_env_string("RTMP_APP", &link.app);
        link.playpath = get_env_string("RTMP_PLAYPATH", &link.playpath);

        if link.playpath.is_empty() {
            logger.log_error("You must provide a playpath, set RTMP_URL or RTMP_PLAYPATH");
            return Err(());
        }

        let default_tc_url = format!(
            "{}://{}:{}/{}",
            link.protocol.as_str().to_lowercase(),
            link.hostname,
            link.port,
            link.app
        );

        link.tc_url = get_env_string("RTMP_TC_URL", &default_tc_url);
        link.swf_url = get_env_string("RTMP_SWF_URL", "");
        link.page_url = get_env_string("RTMP_PAGE_URL", "");
        link.flash_ver = get_env_string("RTMP_FLASH_VER", DEFAULT_FLASH_VER);
        link.auth = get_env_string("RTMP_AUTH", "");
        link.subscribepath = get_env_string("RTMP_SUBSCRIBE_PATH", "");
        link.seek_time = get_env_f64("RTMP_SEEK_MS", 0.0);
        link.length = get_env_u32("RTMP_LENGTH_MS", 0);
        link.live = get_env_bool("RTMP_LIVE", false);
        link.timeout = get_env_u32("RTMP_TIMEOUT", DEFAULT_TIMEOUT_SECONDS);

        let socks = get_env_string("SOCKS_PROXY", "");

        if !socks.is_empty() {
            match socks.split_once(':') {
                Some((host, port_str)) => {
                    link.sockshost = Some(host.to_string());
                    link.socksport = match port_str.parse::<u16>() {
                        Ok(p) => p,
                        Err(_) => {
                            logger.log_error(&format!("Invalid SOCKS proxy port: {}", port_str));
                            return Err(());
                        }
                    };
                }
                None => {
                    link.sockshost = Some(socks);
                    link.socksport = SOCKS_DEFAULT_PORT;
                }
            }
        }

        let swf_hash_hex = get_env_string("SWF_HASH", "");

        if !swf_hash_hex.is_empty() {
            let hash_bytes = match hex::decode(&swf_hash_hex) {
                Ok(b) => b,
                Err(_) => {
                    logger.log_error("SWF_HASH is not valid hexadecimal");
                    return Err(());
                }
            };

            if hash_bytes.len() != 32 {
                logger.log_error("SWF_HASH must be a SHA256 hash (32 bytes)");
                return Err(());
            }

            let mut hash = [0u8; 32];
            hash.copy_from_slice(&hash_bytes);

            link.swf_hash = Some(hash);
            link.swf_size = get_env_u32("SWF_SIZE", 0);

            if link.swf_size == 0 {
                logger.log_error("SWF_HASH requires SWF_SIZE to be set");
                return Err(());
            }
        }

        Ok(link)
    }

    /// Applies an RTMP URL over the link parameters
    /// url_str - The URL (rtmp://host[:port]/app/playpath)
    /// logger - Logger to report errors
    fn apply_url(&mut self, url_str: &str, logger: &Logger) -> Result<(), ()> {
        let parsed = match Url::parse(url_str) {
            Ok(u) => u,
            Err(e) => {
                logger.log_error(&format!("Could not parse RTMP_URL: {}", e));
                return Err(());
            }
        };

        self.protocol = match RtmpProtocol::from_scheme(parsed.scheme()) {
            Some(p) => p,
            None => {
                logger.log_error(&format!("Unknown protocol scheme: {}", parsed.scheme()));
                return Err(());
            }
        };

        if self.protocol != RtmpProtocol::Rtmp {
            logger.log_error(&format!(
                "Protocol not supported: {}",
                self.protocol.as_str()
            ));
            return Err(());
        }

        self.hostname = match parsed.host_str() {
            Some(h) => h.to_string(),
            None => {
                logger.log_error("RTMP_URL has no hostname");
                return Err(());
            }
        };

        self.port = parsed.port().unwrap_or(RTMP_DEFAULT_PORT);

        // First path segment is the application, the rest is the playpath
        let path = parsed.path().trim_start_matches('/');

        match path.split_once('/') {
            Some((app, playpath)) => {
                self.app = app.to_string();
                self.playpath = playpath.to_string();
            }
            None => {
                self.app = path.to_string();
            }
        }

        Ok(())
    }

    /// Logs the link parameters at debug level
    /// logger - Logger to use
    pub fn log_params(&self, logger: &Logger) {
        logger.log_debug(&format!("Protocol : {}", self.protocol.as_str()));
        logger.log_debug(&format!("Hostname : {}", self.hostname));
        logger.log_debug(&format!("Port     : {}", self.port));
        logger.log_debug(&format!("Playpath : {}", self.playpath));
        logger.log_debug(&format!("app      : {}", self.app));

        if !self.tc_url.is_empty() {
            logger.log_debug(&format!("tcUrl    : {}", self.tc_url));
        }

        if !self.swf_url.is_empty() {
            logger.log_debug(&format!("swfUrl   : {}", self.swf_url));
        }

        if !self.page_url.is_empty() {
            logger.log_debug(&format!("pageUrl  : {}", self.page_url));
        }

        if !self.auth.is_empty() {
            logger.log_debug(&format!("auth     : {}", self.auth));
        }

        if !self.subscribepath.is_empty() {
            logger.log_debug(&format!("subscribepath : {}", self.subscribepath));
        }

        if self.seek_time > 0.0 {
            logger.log_debug(&format!("SeekTime : {:.3} sec", self.seek_time / 1000.0));
        }

        if self.length > 0 {
            logger.log_debug(&format!(
                "playLength : {:.3} sec",
                (self.length as f64) / 1000.0
            ));
        }

        logger.log_debug(&format!("live     : {}", if self.live { "yes" } else { "no" }));
        logger.log_debug(&format!("timeout  : {} sec", self.timeout));

        if let Some(sockshost) = &self.sockshost {
            logger.log_debug(&format!(
                "Connecting via SOCKS proxy: {}:{}",
                sockshost, self.socksport
            ));
        }
    }
}

// Tests
