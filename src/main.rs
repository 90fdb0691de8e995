//! Media Scanner Client CLI
//!
//! Queries and observes a scanner provider database.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use media_scanner_client::{
    ClientConfig, ClientError, ClientHandle, ClientSlot, MediaTypeCode, MediaTypeFlag,
    ScanListener, ScanState, SqliteProvider,
};

const ABOUT: &str = r#"
Media Scanner Client - 媒体扫描服务客户端

使用示例:
  media_scanner_client media                       查询音频文件
  media_scanner_client media --types video,image   查询视频和图片
  media_scanner_client state                       查询扫描状态
  media_scanner_client scan-all                    请求全盘扫描
  media_scanner_client watch                       监听扫描开始/结束
  media_scanner_client -d other.db media --json    指定数据库, JSON输出
"#;

/// Media scanner service client
#[derive(Parser)]
#[command(name = "media_scanner_client")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    /// 扫描服务数据库路径
    #[arg(short = 'd', long, global = true, default_value = "media_scanner.db")]
    db: PathBuf,

    /// JSON 配置文件
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 获取媒体信息
    Media {
        /// 媒体类型，例如 audio,video 或 all
        #[arg(short = 't', long)]
        types: Option<MediaTypeFlag>,

        /// 以 JSON 格式输出结果
        #[arg(long)]
        json: bool,
    },
    /// 是否扫描中
    State,
    /// 全盘扫描
    ScanAll,
    /// 监听扫描状态，扫描结束时打印媒体信息（输入结束时退出）
    Watch {
        /// 媒体类型，例如 audio,video 或 all
        #[arg(short = 't', long)]
        types: Option<MediaTypeFlag>,
    },
    /// 写入扫描状态（模拟扫描服务）
    SetState {
        /// 0 = 空闲, 1 = 扫描中
        state: i64,
    },
    /// 添加媒体记录（模拟扫描服务）
    AddMedia {
        /// 文件路径
        path: String,

        /// 媒体类型: audio, video, image
        #[arg(short = 't', long = "type")]
        media_type: MediaTypeCode,
    },
    /// 查看待处理的扫描请求
    Signals {
        /// 取出并删除请求
        #[arg(long)]
        take: bool,
    },
}

/// Logs scan events and prints the media list when a scan ends
struct PrintingListener {
    slot: ClientSlot,
}

impl ScanListener for PrintingListener {
    fn on_scan_begin(&self) {
        info!("onScanBegin");
    }

    fn on_scan_end(&self) {
        info!("onScanEnd");
        if let Some(client) = self.slot.current() {
            print_media_info(&client, false);
        }
    }
}

fn print_media_info(client: &ClientHandle, json: bool) {
    match client.get_media_info() {
        Ok(Some(records)) if json => match serde_json::to_string_pretty(&records) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to serialize media info: {}", e),
        },
        Ok(Some(records)) => {
            for (i, record) in records.iter().enumerate() {
                println!("{}: {}", i, record.path);
            }
        }
        Ok(None) => error!("Media info unavailable"),
        Err(e) => error!("{}", e),
    }
}

fn run(cli: Cli) -> Result<(), ClientError> {
    let config = match &cli.config {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };
    let Some(command) = cli.command else {
        println!("{}", ABOUT);
        println!("使用 'media_scanner_client --help' 查看完整帮助信息");
        return Ok(());
    };

    info!("Provider database: {:?}", cli.db);
    let provider = Arc::new(SqliteProvider::open(&cli.db, &config)?);
    let slot = ClientSlot::global();

    match command {
        Commands::Media { types, json } => {
            let client = slot.get_or_create_with_config(provider, config)?;
            if let Some(flag) = types {
                client.set_media_type_flag(flag)?;
            }
            print_media_info(&client, json);
            client.destroy()?;
        }
        Commands::State => {
            let client = slot.get_or_create_with_config(provider, config)?;
            let state = client.scan_state()?;
            println!("{}", state);
            client.destroy()?;
        }
        Commands::ScanAll => {
            let client = slot.get_or_create_with_config(provider, config)?;
            client.scan_all()?;
            client.destroy()?;
        }
        Commands::Watch { types } => {
            let client = slot.get_or_create_with_config(provider, config)?;
            if let Some(flag) = types {
                client.set_media_type_flag(flag)?;
            }
            let listener: Arc<dyn ScanListener> = Arc::new(PrintingListener { slot: slot.clone() });
            client.register_scan_listener(listener.clone())?;
            info!("Watching scan state (currently {})", client.scan_state()?);

            // Run until stdin closes
            for line in std::io::stdin().lock().lines() {
                if line.is_err() {
                    break;
                }
            }

            client.unregister_scan_listener(&listener)?;
            client.destroy()?;
        }
        Commands::SetState { state } => {
            provider.set_scan_state_code(state)?;
            println!("{}", ScanState::from_code(state));
        }
        Commands::AddMedia { path, media_type } => {
            provider.insert_media(&path, media_type.code())?;
        }
        Commands::Signals { take } => {
            let signals = if take {
                provider.take_signals()?
            } else {
                provider.pending_signals()?
            };
            for signal in signals {
                println!("{} {} {}", signal.id, signal.sent_at.to_rfc3339(), signal.action);
            }
        }
    }
    Ok(())
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
