use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use em_vault::{
    config::{LogConfig, DEFAULT_CONFIG_PATH}, logging, uploader::format_file_size, AppConfig,
    FirebaseAuthClient, IdentityProvider, KeyValueStore, MemoryIdentityProvider, MemoryStore,
    NoticeLevel, RealtimeDbClient, UploadEvent, VaultSession,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "em-vault")]
#[command(author, version, about = "EM Vault 文件库客户端", long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// 登录邮箱
    #[arg(long)]
    email: Option<String>,

    /// 用户名（与 --phone 一起使用，代替 --email）
    #[arg(long, conflicts_with = "email", requires = "phone")]
    username: Option<String>,

    /// 手机号
    #[arg(long)]
    phone: Option<String>,

    /// 登录密码
    #[arg(long)]
    password: Option<String>,

    /// 离线模式：内存存储和内存身份服务，进程退出后数据丢失
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 上传本地文件
    Upload {
        /// 文件路径
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// 列出已上传文件
    List {
        /// 按文件名或分类搜索
        #[arg(short, long)]
        search: Option<String>,
    },
    /// 下载文件
    Download {
        file_id: String,
        /// 保存目录
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// 删除文件（同时删除它的分享链接）
    Delete { file_id: String },
    /// 生成分享链接
    Share { file_id: String },
    /// 列出分享链接
    Shares,
    /// 发送重置密码邮件
    ResetPassword { email: String },
}

/// 根据配置创建会话（远程或离线）
fn build_session(cli: &Cli, config: &AppConfig) -> Result<VaultSession> {
    if cli.offline || !config.firebase.is_configured() {
        if !cli.offline {
            warn!("⚠️  未配置 Firebase（api_key / database_url），使用离线模式");
        }
        let identity = Arc::new(MemoryIdentityProvider::new(config.auth.password_min_length));
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        return Ok(VaultSession::new(config.clone(), identity, Some(store)));
    }

    let identity = Arc::new(
        FirebaseAuthClient::new(&config.firebase).context("创建身份服务客户端失败")?,
    );
    let store: Arc<dyn KeyValueStore> = Arc::new(
        RealtimeDbClient::new(&config.firebase, identity.subscribe())
            .context("创建数据库客户端失败")?,
    );
    info!("✓ 已连接 Firebase: {}", config.firebase.database_url);
    Ok(VaultSession::new(config.clone(), identity, Some(store)))
}

/// 登录；离线模式下先注册同名账号
async fn sign_in(cli: &Cli, session: &VaultSession) -> Result<()> {
    let Some(password) = cli.password.as_deref() else {
        bail!("需要 --password");
    };

    match (&cli.email, &cli.username, &cli.phone) {
        (_, Some(username), Some(phone)) => {
            if cli.offline {
                session.sign_up(username, phone, password).await?;
            } else {
                session.sign_in(username, phone, password).await?;
            }
        }
        (Some(email), _, _) => {
            if cli.offline {
                bail!("离线模式请使用 --username 和 --phone 登录");
            }
            session.sign_in_with_email(email, password).await?;
        }
        _ => bail!("需要 --email 或 --username/--phone"),
    }
    Ok(())
}

/// 上传并等待本批次结束，期间打印统计
async fn run_upload(session: &VaultSession, files: &[PathBuf]) -> Result<()> {
    let mut rx = session.subscribe();
    let report = session.add_paths(files).await;
    if report.added.is_empty() {
        bail!("没有可上传的文件（{} 个被拒绝）", report.rejected.len());
    }
    if !session.config().upload.auto_upload {
        session.start_uploads();
    }

    loop {
        match rx.recv().await {
            Ok(UploadEvent::Stats { snapshot }) => {
                info!(
                    "进度 {} | 队列 {} | 当前 {} | 平均 {} | 峰值 {}",
                    snapshot.overall_percent_text(),
                    snapshot.queue_count,
                    snapshot.current_speed_text,
                    snapshot.average_speed_text,
                    snapshot.peak_speed_text
                );
            }
            Ok(UploadEvent::Notice { level, message }) => match level {
                NoticeLevel::Error => error!("{}", message),
                NoticeLevel::Warning => warn!("{}", message),
                _ => info!("{}", message),
            },
            Ok(UploadEvent::BatchFinished {
                completed,
                failed,
                cancelled,
            }) => {
                info!(
                    "✓ 上传结束: 成功 {}, 失败 {}, 取消 {}",
                    completed, failed, cancelled
                );
                if failed > 0 {
                    bail!("{} 个文件上传失败", failed);
                }
                return Ok(());
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("事件积压，跳过 {} 条", skipped),
            Err(RecvError::Closed) => bail!("事件通道已关闭"),
        }
    }
}

async fn run(cli: Cli, session: &VaultSession) -> Result<()> {
    if let Command::ResetPassword { email } = &cli.command {
        session.send_password_reset(email).await?;
        info!("重置密码邮件已发送: {}", email);
        return Ok(());
    }

    sign_in(&cli, session).await?;

    match &cli.command {
        Command::Upload { files } => run_upload(session, files).await?,
        Command::List { search } => {
            let files = session.list_files().await?;
            let matched = em_vault::library::search_files(&files, search.as_deref().unwrap_or(""));
            for file in &matched {
                println!(
                    "{}\t{}\t{}\t{}",
                    file.id,
                    file.file_type.label(),
                    format_file_size(file.size),
                    file.name
                );
            }
            info!("共 {} 个文件", matched.len());
        }
        Command::Download { file_id, output } => {
            let path = session.download_file(file_id, output).await?;
            println!("{}", path.display());
        }
        Command::Delete { file_id } => session.delete_file(file_id).await?,
        Command::Share { file_id } => {
            let link = session.create_share(file_id).await?;
            println!("{}", link.shareable_url);
        }
        Command::Shares => {
            for share in session.list_shares().await? {
                println!("{}\t{}\t{}", share.id, share.file_name, share.shareable_url);
            }
        }
        Command::ResetPassword { .. } => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 🔥 先只加载日志配置并初始化日志，再加载完整配置
    let log_config = LogConfig::load_from_config_file(&cli.config).await;
    let _log_guard = logging::init_logging(&log_config);
    info!("EM Vault v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default(&cli.config).await;

    let session = build_session(&cli, &config)?;
    let result = run(cli, &session).await;
    session.shutdown();

    if let Err(e) = &result {
        error!("执行失败: {:#}", e);
    }
    result
}
