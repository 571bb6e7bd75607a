//! 命令行参数、环境变量与服务默认配置。

use clap::Parser;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_UPLOAD_DIR: &str = "public/assets/upload";
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 20 * 1024 * 1024;
pub const DEFAULT_STAGED_TTL_SECS: u64 = 60 * 60;
pub const STAGED_SWEEP_INTERVAL_SECS: u64 = 900;
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// 服务的命令行参数与环境变量配置。
#[derive(Parser, Debug)]
#[command(name = "image-vault", version, about = "Image upload and management API")]
pub struct Args {
    #[arg(
        short = 'p',
        long,
        env = "UPLOAD_API_PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        short = 'b',
        long,
        env = "UPLOAD_API_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'd',
        long,
        env = "UPLOAD_API_DIR",
        default_value = DEFAULT_UPLOAD_DIR,
        help = "Upload root directory"
    )]
    pub upload_dir: String,
    #[arg(
        long,
        env = "UPLOAD_API_MAX_UPLOAD_SIZE",
        default_value_t = DEFAULT_MAX_UPLOAD_SIZE,
        help = "Max upload request body in bytes"
    )]
    pub max_upload_size: usize,
    #[arg(
        long,
        env = "UPLOAD_API_SERVE_ASSETS",
        default_value_t = false,
        help = "Also serve the upload root at /assets/upload"
    )]
    pub serve_assets: bool,
    #[arg(
        long,
        env = "UPLOAD_API_STAGED_TTL_SECS",
        default_value_t = DEFAULT_STAGED_TTL_SECS,
        help = "Remove orphaned staged uploads older than this (0 to disable)"
    )]
    pub staged_ttl_secs: u64,
}
