//! IoT chat 服务主入口

use iot_chat::{
    config::AppConfig,
    handlers::health,
    llm,
    middleware::AppState,
    routes,
    services::{ChatService, IotClient},
    session::SessionStore,
    telemetry,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("iot-chat {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 按优先级加载：.env.local > .env
    dotenv::from_filename(".env.local").ok();
    dotenv::dotenv().ok();

    health::set_start_time();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "IoT chat starting...");

    if config.session.uses_default_secret() {
        tracing::warn!(
            "IOTCHAT_SESSION__SECRET is not set; session cookies are signed with the development secret"
        );
    }

    // 3. 上游客户端
    let iot_client = Arc::new(IotClient::from_config(&config.iot)?);
    let llm_client = llm::create_client(&config.llm)?;

    tracing::info!(
        iot_base_url = %config.iot.base_url,
        model = %config.llm.model,
        cache_token = config.iot.cache_token,
        "Upstream clients ready"
    );

    // 4. 构建应用状态
    let app_state = Arc::new(AppState {
        config: config.clone(),
        chat_service: Arc::new(ChatService::new(llm_client, iot_client, config.llm.max_tokens)),
        sessions: Arc::new(SessionStore::from_config(&config.session)),
    });

    // 5. 构建路由
    let app = routes::create_router(app_state);

    // 6. 启动服务器
    let addr = &config.server.addr;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    // 7. 优雅关闭
    let grace = std::time::Duration::from_secs(config.server.graceful_shutdown_timeout_secs);
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    // 超时后强制关闭
    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }
}

/// 打印帮助信息
fn print_help() {
    println!("iot-chat {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: iot-chat [--version | --help]");
    println!();
    println!("Environment:");
    println!("  All settings come from IOTCHAT_* variables (nested keys use __),");
    println!("  e.g. IOTCHAT_IOT__BASE_URL, IOTCHAT_LLM__API_KEY.");
    println!("  See .env.example for the full list.");
}
