use clap::{Parser, ValueEnum};
use iota_jexl::{extract_context, Attribute, Fallback, JexlParser, ParserOptions};
use serde_json::Value;
use tracing::Level;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FallbackArg {
    /// Keep the expression text
    Expression,
    Null,
}

/// Resolve expression attributes against a device measure list.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Reported measures as a JSON array of {name, value, object_id?}
    measures: String,
    /// Declared attributes as a JSON array of {name, type, expression, object_id?}
    #[arg(required_unless_present = "expression")]
    attributes: Option<String>,
    /// Evaluate a single expression instead of an attribute list
    #[arg(short, long)]
    expression: Option<String>,
    /// Entity type information passed through to the resolver
    #[arg(long, default_value = "null")]
    type_info: String,
    /// Value used when an expression evaluates to nothing
    #[arg(long, value_enum, default_value_t = FallbackArg::Expression)]
    fallback: FallbackArg,
    /// Parse expressions on every evaluation
    #[arg(long)]
    no_cache: bool,
    /// Log evaluation traces
    #[arg(short, long)]
    verbose: bool,
}

fn parse_json<T: serde::de::DeserializeOwned>(what: &str, raw: &str) -> T {
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Invalid {what} JSON: {e}");
            std::process::exit(1);
        }
    }
}

fn main() {
    // Parse CLI arguments.
    let args = Args::parse();

    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    // Parse input JSON.
    let measures: Vec<Attribute> = parse_json("measures", &args.measures);
    let type_info: Value = parse_json("type information", &args.type_info);

    // Build parser.
    let parser = JexlParser::with_options(ParserOptions {
        fallback: match args.fallback {
            FallbackArg::Expression => Fallback::Expression,
            FallbackArg::Null => Fallback::Null,
        },
        cache_expressions: !args.no_cache,
    });
    let context = extract_context(&measures);

    // Evaluate.
    let out = match (&args.expression, &args.attributes) {
        (Some(expr), _) => parser.parse(expr, &context).map_err(|e| e.to_string()),
        (None, Some(raw)) => {
            let attributes: Vec<Attribute> = parse_json("attributes", raw);
            parser
                .process_expression_attributes(&type_info, &attributes, &context)
                .map_err(|e| format!("{e} ({})", e.source))
                .and_then(|resolved| serde_json::to_value(resolved).map_err(|e| e.to_string()))
        }
        (None, None) => Err("nothing to evaluate".to_string()),
    };

    // Output result.
    match out {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    }
}
