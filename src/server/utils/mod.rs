pub mod adblock_bypass;
pub mod blocklist;
pub mod client_script;
pub mod obfuscation;
pub mod url_utils;
pub mod video_patterns;
