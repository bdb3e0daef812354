use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// 終端機使用 compact，排程器或容器環境使用 JSON 便於集中收集
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Compact
        }
    }
}

/// 未設定 RUST_LOG 時的預設過濾；verbose 才開啟本 crate 的 debug 與其他 crate 的 info
pub fn filter_directive(verbose: bool) -> &'static str {
    if verbose {
        "warehouse_sync=debug,info"
    } else {
        "warehouse_sync=info,warn"
    }
}

/// 日誌寫到 stderr，stdout 保留給執行報告 JSON
pub fn init_logger(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbose)));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_file(false)
        .with_line_number(false);
    let layer = match format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_parses() {
        for verbose in [false, true] {
            assert!(filter_directive(verbose).parse::<EnvFilter>().is_ok());
        }
        assert!(filter_directive(true).contains("warehouse_sync=debug"));
        assert_eq!(LogFormat::from_flag(true), LogFormat::Json);
    }
}
