use clap::Parser;
use portal_watch::core::{ConfigProvider, Notifier};
use portal_watch::utils::{logger, validation::Validate};
use portal_watch::{
    EmailSettings, LocalStorage, LogNotifier, MonitorConfig, MonitorEngine, PortalPipeline,
    SmtpNotifier,
};

#[derive(Parser)]
#[command(name = "portal-watch")]
#[command(about = "Scheduled portal monitor: fetch, diff, notify on change")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "portal-watch.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON logs (for scheduled runners collecting structured output)
    #[arg(long)]
    log_json: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override the state file name from config
    #[arg(long)]
    state_file: Option<String>,

    /// Log the report instead of sending email, regardless of config
    #[arg(long)]
    no_email: bool,

    /// Dry run - show what would be checked without touching the network
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 初始化日誌
    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting portal-watch");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    // 載入 TOML 配置
    let mut config = match MonitorConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 應用命令列覆蓋設定
    if let Some(state_file) = args.state_file.clone() {
        config.state.file = Some(state_file);
        tracing::info!("🔧 State file overridden to: {}", config.state_file());
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    // 顯示配置摘要
    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No portal requests will be made");
        perform_dry_run(&config, &args);
        return Ok(());
    }

    // 決定監控設定
    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());

    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    // 創建通知器：email 關閉時退回日誌輸出
    let email_settings = config
        .email
        .clone()
        .filter(|email| email.enabled && !args.no_email)
        .map(|email| EmailSettings {
            smtp_host: email.smtp_host,
            smtp_port: email.smtp_port.unwrap_or(587),
            to: email.to.unwrap_or_else(|| email.from.clone()),
            from: email.from,
            password: email.password,
        });
    let notifier: Box<dyn Notifier> = match email_settings {
        Some(settings) => match SmtpNotifier::new(settings) {
            Ok(notifier) => Box::new(notifier),
            Err(e) => {
                tracing::warn!("⚠️ Email notifier unavailable, falling back to log output: {}", e);
                Box::new(LogNotifier)
            }
        },
        None => Box::new(LogNotifier),
    };

    // 創建存儲和管道
    let storage = LocalStorage::new(config.state_path().to_string());
    let pipeline = PortalPipeline::new(storage, config, notifier);

    // 創建引擎並運行
    let engine = MonitorEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(summary) => {
            tracing::info!("🎯 Monitoring run completed successfully!");
            println!("✅ Portal check completed successfully!");
            println!(
                "📦 {} fields fetched, {} change(s) detected",
                summary.fields_fetched, summary.changes_detected
            );
            if summary.notified {
                println!("📧 Notification sent");
            }
            println!("💾 Snapshot saved to: {}", summary.state_file);
        }
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ Monitoring run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            // 輸出用戶友好的錯誤信息
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                portal_watch::utils::error::ErrorSeverity::Low => 0, // 警告，但成功
                portal_watch::utils::error::ErrorSeverity::Medium => 2, // 重試錯誤
                portal_watch::utils::error::ErrorSeverity::High => 1, // 處理錯誤
                portal_watch::utils::error::ErrorSeverity::Critical => 3, // 系統錯誤
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &MonitorConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Monitor: {} v{}",
        config.monitor.name, config.monitor.version
    );
    println!("  Portal: {}", config.api_endpoint());
    println!("  Sections: {}", config.sections().join(", "));
    println!(
        "  State: {}/{}",
        config.state_path(),
        config.state_file()
    );
    println!(
        "  Email: {}",
        if config.email_enabled() && !args.no_email {
            "enabled"
        } else {
            "log only"
        }
    );

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &MonitorConfig, args: &Args) {
    println!("🔍 Dry Run Analysis:");
    println!();

    // 入口網站分析
    println!("📡 Portal:");
    println!("  Endpoint: {}", config.api_endpoint());
    println!("  Username: {}", config.username());
    println!(
        "  Retry policy: {} attempts, {:?} apart",
        config.retry_attempts(),
        config.retry_delay()
    );
    println!("  Request timeout: {:?}", config.request_timeout());

    println!();
    println!("⚙️ Watch Plan:");
    for section in config.sections() {
        println!("  📊 Summary of '{}'", section);
    }
    println!("  📚 Course details for every course the summaries advertise");
    println!(
        "  🎓 Transcript details for years >= {}",
        config.min_transcript_year()
    );

    println!();
    println!("💾 State:");
    println!("  File: {}/{}", config.state_path(), config.state_file());

    println!();
    println!("📧 Notification:");
    if let Some(email) = config
        .email
        .as_ref()
        .filter(|email| email.enabled && !args.no_email)
    {
        println!(
            "  SMTP: {}:{}",
            email.smtp_host,
            email.smtp_port.unwrap_or(587)
        );
        println!("  From: {}", email.from);
        println!(
            "  To: {}",
            email.to.as_deref().unwrap_or(email.from.as_str())
        );
    } else {
        println!("  Disabled - changes would be logged only");
    }

    println!();
    println!("✅ Dry run analysis complete. Run without --dry-run to check the portal.");
}
