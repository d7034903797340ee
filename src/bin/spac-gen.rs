//! spac-gen: CLI tool for PAC generation, list translation and rule checks.

use clap::{Parser, Subcommand};
use spac::adblock::ListEntry;
use spac::bootstrap::decode_base64;
use spac::{
    AdBlockList, Connection, FilterRegistry, GfwListFilter, PacGenerator, Request, RuleCompiler,
    Target,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "spac-gen")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Generate PAC scripts and check SPAC rules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an AdBlock-style list into a PAC script
    Pac {
        /// Input list file
        #[arg(short, long)]
        input: PathBuf,

        /// Additional user list appended to the input
        #[arg(short, long)]
        user: Option<PathBuf>,

        /// Output PAC file
        #[arg(short, long)]
        output: PathBuf,

        /// Proxy address written into the script
        #[arg(short, long, default_value = spac::config::DEFAULT_PAC_PROXY)]
        proxy: String,

        /// Input is base64-encoded (as distributed GFW lists are)
        #[arg(long)]
        base64: bool,

        /// Rule source shown in the header
        #[arg(long, default_value = "")]
        source: String,

        /// JavaScript placed before the generated rules
        #[arg(long, default_value = "")]
        pre: String,

        /// JavaScript placed after the generated rules
        #[arg(long, default_value = "")]
        post: String,
    },

    /// Print the translated expressions of list lines
    Translate {
        /// List lines to translate
        #[arg(required = true)]
        lines: Vec<String>,
    },

    /// Evaluate rule files against a request
    Check {
        /// Rule files in priority order
        #[arg(short, long, required = true)]
        rules: Vec<PathBuf>,

        /// Request URL (or host:port for CONNECT)
        url: String,

        /// Request method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Treat the request as coming from inside an HTTPS tunnel
        #[arg(long)]
        https: bool,

        /// List file installed as the IsBlockedByGFW filter
        #[arg(long)]
        gfwlist: Option<PathBuf>,

        /// Default target name
        #[arg(short, long, default_value = "GAE")]
        default: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Pac {
            input,
            user,
            output,
            proxy,
            base64,
            source,
            pre,
            post,
        } => {
            let generator = PacGenerator::new(&proxy)
                .with_custom_pre(&pre)
                .with_custom_post(&post);
            generate_pac(&input, user.as_ref(), &output, &generator, base64, &source)
        }
        Commands::Translate { lines } => {
            translate_lines(&lines);
            Ok(())
        }
        Commands::Check {
            rules,
            url,
            method,
            https,
            gfwlist,
            default,
        } => check(rules, &url, &method, https, gfwlist, &default),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn generate_pac(
    input: &PathBuf,
    user: Option<&PathBuf>,
    output: &PathBuf,
    generator: &PacGenerator,
    base64: bool,
    source: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = fs::read(input)?;
    let content = if base64 {
        decode_base64(&raw)?
    } else {
        String::from_utf8(raw)?
    };

    let mut list = AdBlockList::parse(&content);
    if let Some(user) = user {
        list.extend(&fs::read_to_string(user)?);
    }

    let date = chrono::Utc::now().to_rfc2822();
    let script = generator.generate(&list, source, &date);
    fs::write(output, script)?;

    println!("Generated {:?} with {} rules", output, list.len());
    Ok(())
}

fn translate_lines(lines: &[String]) {
    for line in lines {
        let Some(entry) = ListEntry::parse(line) else {
            println!("{}\n  (skipped)", line);
            continue;
        };
        println!("{}", line);
        println!("  action: {:?}", entry.action());
        match entry.native_error() {
            Some(e) => println!("  native: error: {}", e.source),
            None => println!("  native: {}", entry.native_expr()),
        }
        println!("  script: {}", entry.script_expr());
        if entry.is_script_only() {
            println!("  (PAC script only)");
        }
    }
}

fn check(
    rules: Vec<PathBuf>,
    url: &str,
    method: &str,
    https: bool,
    gfwlist: Option<PathBuf>,
    default: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let default_target: Target = default.parse()?;
    let ruleset = RuleCompiler::new(rules, default_target.clone()).compile()?;

    let filters = FilterRegistry::new();
    if let Some(path) = gfwlist {
        filters.register(
            spac::adblock::GFW_FILTER_NAME,
            Arc::new(GfwListFilter::from_files(&[path])),
        );
    }

    let request = if method.eq_ignore_ascii_case("CONNECT") {
        Request::connect(url)
    } else {
        let mut request = Request::get(url);
        request.method = method.to_uppercase();
        request
    };
    let connection = if https {
        Connection::https_tunnel()
    } else {
        Connection::http()
    };

    let decision = ruleset.select(&request, connection.is_https(), &filters, vec![default_target]);

    println!("Loaded {} rules", ruleset.len());
    if decision.matched {
        println!("Matched rule");
    } else {
        println!("No rule matched, using default");
    }
    let targets: Vec<String> = decision.targets.iter().map(|t| t.to_string()).collect();
    println!("Targets: {}", targets.join(", "));
    let mut attrs: Vec<&str> = decision.attrs.iter().collect();
    attrs.sort();
    if !attrs.is_empty() {
        println!("Attributes: {}", attrs.join(", "));
    }
    Ok(())
}
