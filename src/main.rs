use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tracking_query::{Dialect, ParserConfig, QueryParser, SearchStatement};

/// 要编译的查询类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchKind {
    Runs,
    Metrics,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// 加载配置：命令行指定的 JSON 文件，或默认配置
fn load_config() -> Result<ParserConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let config = ParserConfig::from_json_file(&path)
                .with_context(|| format!("无法加载配置文件 {}", path))?;
            info!(path = %path, "配置已加载");
            Ok(config)
        }
        None => {
            info!("未指定配置文件，使用默认配置");
            Ok(ParserConfig::default())
        }
    }
}

fn print_help() {
    println!("输入过滤表达式，例如: run.metrics['loss'].last < 0.5 and 'bert' in run.name");
    println!("命令:");
    println!("  :runs             编译为 run 查询");
    println!("  :metrics          编译为 metric 查询");
    println!("  :dialect <name>   切换 SQL 方言 (postgres, sqlite)");
    println!("  :help             显示帮助");
    println!("  :quit             退出");
}

fn compile(parser: &QueryParser, kind: SearchKind, filter: &str) {
    let statement = match kind {
        SearchKind::Runs => SearchStatement::runs(parser.tables(), parser.dialect()),
        SearchKind::Metrics => SearchStatement::metrics(parser.tables(), parser.dialect()),
    };

    match parser.compile(filter) {
        Ok(query) => {
            let statement = statement.filter(query);
            let (sql, values) = statement.build();
            println!("{}", sql);
            println!("参数: {:?}", values.0);
        }
        Err(e) => {
            println!("✗ {}", e);
            if let Some(span) = e.span {
                println!("  位置 {}-{}", span.start, span.end);
            }
        }
    }
}

fn main() -> Result<()> {
    init_logging();

    let config = load_config()?;
    let mut parser = QueryParser::from_config(config.clone())?;
    let mut kind = SearchKind::Runs;

    println!("--- 过滤表达式到 SQL 编译器 ({}) ---", parser.dialect());
    print_help();

    let mut editor = DefaultEditor::new()?;
    loop {
        let prompt = match kind {
            SearchKind::Runs => "runs> ",
            SearchKind::Metrics => "metrics> ",
        };

        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        match line.split_once(char::is_whitespace).unwrap_or((line, "")) {
            (":quit" | ":q", _) => break,
            (":help", _) => print_help(),
            (":runs", _) => kind = SearchKind::Runs,
            (":metrics", _) => kind = SearchKind::Metrics,
            (":dialect", name) => match name.trim().parse::<Dialect>() {
                Ok(dialect) => {
                    let config = ParserConfig { dialect: dialect.to_string(), ..config.clone() };
                    parser = QueryParser::from_config(config)?;
                    println!("方言已切换为 {}", dialect);
                }
                Err(e) => warn!(error = %e, "无法切换方言"),
            },
            (command, _) if command.starts_with(':') => println!("未知命令 {}", command),
            _ => compile(&parser, kind, line),
        }
    }

    Ok(())
}
