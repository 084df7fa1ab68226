use serde_json::json;
use std::path::PathBuf;
use std::process;
use tablegate::{
    reindex_by_key, Config, ConnectionManager, GatewayError, RawOutcome, Result, Value,
    DEFAULT_MODULE,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: tablegate [--config PATH] [--module NAME] [--log] SQL [VALUE...]";

#[derive(Debug, PartialEq)]
struct Invocation {
    config: Option<PathBuf>,
    module: String,
    log: bool,
    sql: String,
    values: Vec<Value>,
}

fn main() {
    // Diagnostics go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            process::exit(1);
        }
    };

    match run(invocation) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run(invocation: Invocation) -> Result<serde_json::Value> {
    let config_path = invocation
        .config
        .or_else(Config::default_path)
        .ok_or_else(|| GatewayError::Config("no configuration directory available".to_string()))?;
    info!("Loading configuration from {}", config_path.display());

    let mut manager = ConnectionManager::from_path(&config_path)?;
    let db = manager.connection(&invocation.module)?;
    if invocation.log {
        manager.start_logging(Some(&invocation.module))?;
    }

    Ok(match db.raw(&invocation.sql, &invocation.values)? {
        RawOutcome::Rows(rows) => reindex_by_key(rows).to_json(db.descriptor().row_shape),
        RawOutcome::Affected {
            rows,
            last_insert_id,
        } => json!({ "affected": rows, "last_insert_id": last_insert_id }),
    })
}

fn parse_args(args: &[String]) -> std::result::Result<Invocation, String> {
    let mut config = None;
    let mut module = DEFAULT_MODULE.to_string();
    let mut log = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "--module" => {
                module = iter.next().ok_or("--module needs a name")?.clone();
            }
            "--log" => log = true,
            _ => positional.push(arg.as_str()),
        }
    }

    let (sql, values) = positional.split_first().ok_or("missing SQL statement")?;
    Ok(Invocation {
        config,
        module,
        log,
        sql: sql.to_string(),
        values: values.iter().map(|v| parse_value(v)).collect(),
    })
}

fn parse_value(raw: &str) -> Value {
    if raw == "null" {
        Value::Null
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Real(f)
    } else {
        Value::Text(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let invocation = parse_args(&args(&[
            "--module",
            "shop",
            "SELECT * FROM t WHERE a = ? AND b = ?",
            "7",
            "x",
            "--log",
        ]))
        .unwrap();
        assert_eq!(invocation.module, "shop");
        assert!(invocation.log);
        assert!(invocation.config.is_none());
        assert_eq!(invocation.values, vec![Value::Integer(7), Value::from("x")]);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["--config"])).is_err());
        assert!(parse_args(&args(&["--log"])).is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("null"), Value::Null);
        assert_eq!(parse_value("-3"), Value::Integer(-3));
        assert_eq!(parse_value("2.5"), Value::Real(2.5));
        assert_eq!(parse_value("NULL"), Value::from("NULL"));
        assert_eq!(parse_value("abc"), Value::from("abc"));
    }
}
