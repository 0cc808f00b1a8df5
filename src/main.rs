use std::process::ExitCode;

use anyhow::{Context, Result};
use batch_config::{AppConfig, ConfigValidator};
use batch_domain::OutcomeKind;
use batch_processor::{wait_for_shutdown_signal, Application, ShutdownManager};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 有界并发的幂等批处理器
#[derive(Parser, Debug)]
#[command(name = "batch-processor")]
#[command(version = "1.0.0")]
#[command(about = "以有限并发处理订单消息并幂等写入数据库")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 模拟订单数量
    #[arg(long)]
    count: Option<usize>,

    /// 最大并发数
    #[arg(long)]
    concurrency: Option<usize>,

    /// 数据库连接URL（`memory` 表示进程内存储）
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,

    /// 日志级别
    #[arg(short, long, value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_parser = ["json", "pretty"])]
    log_format: Option<String>,

    /// 输出每个失败工作项的详情
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!(
        max_concurrency = config.worker.max_concurrency,
        count = config.worker.source_count,
        "启动批处理器"
    );

    let app = Application::new(config).await?;
    let shutdown_manager = ShutdownManager::new();

    let signal_handle = {
        let shutdown_manager = shutdown_manager.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("收到关闭信号，停止接收新的工作项...");
            shutdown_manager.shutdown().await;
        })
    };

    let source = batch_domain::SyntheticOrderSource::new(app.config().worker.source_count);
    let result = app.run_source(&source, shutdown_manager.subscribe()).await;
    signal_handle.abort();
    app.shutdown().await;

    let (summary, outcomes) = result?;

    if cli.verbose {
        for outcome in outcomes.iter().filter(|o| o.kind == OutcomeKind::FailedFinal) {
            warn!(
                sequence = outcome.item.sequence(),
                attempts = outcome.attempts,
                error = outcome.error.as_deref().unwrap_or_default(),
                "item failed"
            );
        }
    }

    info!(
        total = summary.total_items,
        succeeded = summary.succeeded,
        skipped_invalid = summary.skipped_invalid,
        failed = summary.failed,
        not_dispatched = summary.not_dispatched,
        cancelled = summary.cancelled,
        peak_concurrency = summary.peak_concurrency,
        elapsed_ms = summary.elapsed_ms,
        "批处理完成"
    );

    if summary.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("存在未成功完成的工作项");
        Ok(ExitCode::FAILURE)
    }
}

/// 加载配置并应用命令行覆盖
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("加载配置失败")?;

    if let Some(count) = cli.count {
        config.worker.source_count = count;
    }
    if let Some(concurrency) = cli.concurrency {
        config.worker.max_concurrency = concurrency;
    }
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.observability.log_format = format.clone();
    }

    config.validate().context("命令行参数无效")?;
    Ok(config)
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}
