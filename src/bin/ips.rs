//! IPS CLI: key generation, message lifecycle and signing diagnostics.
//!
//! Usage:
//!   ips keygen --name <BIC> [--bits 2048] [--out <dir>]
//!   ips send --receiver <BIC> --receiver-cert <file> --ref <REF> --type <N> --date <DATE>
//!            --amount <DEC> --ccy <CCY> (--content <TEXT> | --content-file <FILE>)
//!   ips cancel --ref <REF> [--reason <TEXT>]
//!   ips complete --id <ID>
//!   ips reject --id <ID> --reason <TEXT>
//!   ips inbox [--all] [--decrypt]
//!   ips outbox [--cursor <URI>]
//!   ips decrypt --in <FILE>
//!   ips canonicalize --method <M> --url <URL> [--header <name:value>]... [--body-file <FILE>]
//!
//! Connection and credentials come from flags or IPS_* environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Url};

use ips_client::message::parse_date;
use ips_client::{
    canonicalize, load_certificate, Amount, ApiClient, ApiRequest, ClientConfig, CmsEngine,
    Credentials, MessageCollection, OutgoingPayment, QueryCanonicalization,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// IPS instant-payment messaging client.
#[derive(Parser, Debug)]
#[command(name = "ips", version, about)]
struct Cli {
    #[command(flatten)]
    conn: Connection,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Connection {
    /// API root address.
    #[arg(long, global = true, env = "IPS_API_ROOT")]
    api_root: Option<String>,

    /// Participant identifier (BIC).
    #[arg(long, global = true, env = "IPS_PARTICIPANT_ID")]
    participant: Option<String>,

    /// Participant private key (PEM or DER).
    #[arg(long, global = true, env = "IPS_KEY_PATH")]
    key: Option<PathBuf>,

    /// Participant certificate (PEM or DER).
    #[arg(long, global = true, env = "IPS_CERT_PATH")]
    cert: Option<PathBuf>,

    /// Whole-request timeout in seconds.
    #[arg(long, global = true, env = "IPS_TIMEOUT_SECS", default_value = "30")]
    timeout: u64,

    /// Connect timeout in seconds.
    #[arg(long, global = true, env = "IPS_CONNECT_TIMEOUT_SECS", default_value = "10")]
    connect_timeout: u64,

    /// Cover query parameters in request signatures.
    #[arg(
        long,
        global = true,
        env = "IPS_SIGN_QUERY",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    sign_query: bool,

    /// Shorthand for `--sign-query false` (older deployments).
    #[arg(long, global = true)]
    legacy_query: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an RSA key and a self-signed certificate.
    Keygen {
        /// Certificate common name, usually the participant BIC.
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "2048")]
        bits: usize,
        /// Output directory for key.pem and cert.pem.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Encrypt and send a payment message.
    Send(SendArgs),
    /// Cancel a sent message that is not processed yet.
    Cancel {
        #[arg(long = "ref")]
        reference: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Accept a received message.
    Complete {
        #[arg(long)]
        id: i64,
    },
    /// Reject a received message.
    Reject {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        reason: String,
    },
    /// List received messages (only new ones unless --all).
    Inbox {
        #[arg(long)]
        all: bool,
        /// Print decrypted content of each message.
        #[arg(long)]
        decrypt: bool,
    },
    /// List sent messages and their states.
    Outbox {
        /// `next` value from a previous listing.
        #[arg(long)]
        cursor: Option<String>,
    },
    /// Decrypt a CMS envelope (DER or base64) with the participant key.
    Decrypt {
        #[arg(long = "in")]
        input: PathBuf,
    },
    /// Print the signing string for a request.
    Canonicalize {
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long)]
        url: String,
        /// `name:value`, repeatable.
        #[arg(long = "header")]
        headers: Vec<String>,
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SendArgs {
    #[arg(long)]
    receiver: String,
    #[arg(long)]
    receiver_cert: PathBuf,
    #[arg(long = "ref")]
    reference: String,
    #[arg(long = "type")]
    message_type: i16,
    /// RFC 3339 date-time or YYYY-MM-DD.
    #[arg(long, value_parser = parse_date)]
    date: DateTime<Utc>,
    #[arg(long)]
    amount: Amount,
    #[arg(long)]
    ccy: String,
    #[arg(long, conflicts_with = "content_file", required_unless_present = "content_file")]
    content: Option<String>,
    #[arg(long)]
    content_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let log_format = std::env::var("IPS_LOG_FORMAT").unwrap_or_else(|_| "pretty".into());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ips_client=warn,ips=warn".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if log_format == "json" {
        builder.json().with_target(true).init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> CliResult {
    let conn = cli.conn;
    match cli.command {
        Command::Keygen { name, bits, out } => cmd_keygen(&name, bits, &out),
        Command::Send(args) => cmd_send(&conn, args),
        Command::Cancel { reference, reason } => {
            client(&conn)?.cancel(&reference, reason.as_deref())?;
            Ok(())
        }
        Command::Complete { id } => {
            client(&conn)?.complete(id)?;
            Ok(())
        }
        Command::Reject { id, reason } => {
            client(&conn)?.reject(id, &reason)?;
            Ok(())
        }
        Command::Inbox { all, decrypt } => {
            let client = client(&conn)?;
            let inbox = client.browse_inbox(all)?;
            print_collection(&inbox)?;
            if decrypt {
                for message in &inbox.items {
                    let label = message.reference.as_deref().unwrap_or("-");
                    println!("--- {} ---", label);
                    println!("{}", client.decrypt(message)?);
                }
            }
            Ok(())
        }
        Command::Outbox { cursor } => {
            let outbox = client(&conn)?.browse_outbox(cursor.as_deref())?;
            print_collection(&outbox)
        }
        Command::Decrypt { input } => cmd_decrypt(&conn, &input),
        Command::Canonicalize {
            method,
            url,
            headers,
            body_file,
        } => cmd_canonicalize(&conn, &method, &url, &headers, body_file.as_deref()),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_keygen(name: &str, bits: usize, out: &Path) -> CliResult {
    fs::create_dir_all(out)?;
    let creds = Credentials::generate_self_signed(name, bits)?;

    let key_path = out.join("key.pem");
    let cert_path = out.join("cert.pem");
    fs::write(&key_path, creds.private_key_pem()?.as_bytes())?;
    fs::write(&cert_path, creds.certificate_pem()?)?;

    println!("private key: {}", key_path.display());
    println!("certificate: {}", cert_path.display());
    Ok(())
}

fn cmd_send(conn: &Connection, args: SendArgs) -> CliResult {
    let content = match (args.content, args.content_file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(path)?,
        (None, None) => return Err("one of --content or --content-file is required".into()),
    };
    let receiver_cert = load_certificate(&fs::read(&args.receiver_cert)?)?;
    let payment = OutgoingPayment {
        receiver: args.receiver,
        reference: args.reference,
        message_type: args.message_type,
        date: args.date,
        amount: args.amount,
        currency: args.ccy,
        content,
    };
    client(conn)?.send(&receiver_cert, &payment)?;
    println!("sent {}", payment.reference);
    Ok(())
}

fn cmd_decrypt(conn: &Connection, input: &Path) -> CliResult {
    let raw = fs::read(input)?;
    let decoded = std::str::from_utf8(&raw)
        .ok()
        .map(|text| STANDARD.decode(text.trim()));
    let envelope = match decoded {
        Some(bytes) => bytes?,
        None => raw,
    };
    let creds = credentials(conn)?;
    let plain = CmsEngine::new().decrypt(&envelope, creds.private_key())?;
    println!("{}", String::from_utf8_lossy(&plain));
    Ok(())
}

fn cmd_canonicalize(
    conn: &Connection,
    method: &str,
    url: &str,
    headers: &[String],
    body_file: Option<&Path>,
) -> CliResult {
    let mut request = ApiRequest::new(Method::from_bytes(method.as_bytes())?, Url::parse(url)?);
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("header must be name:value, got {:?}", header))?;
        request.headers.append(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }
    if let Some(path) = body_file {
        request.body = fs::read(path)?;
    }
    print!("{}", canonicalize(&request, query_mode(conn)));
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn query_mode(conn: &Connection) -> QueryCanonicalization {
    if conn.legacy_query || !conn.sign_query {
        QueryCanonicalization::Omitted
    } else {
        QueryCanonicalization::Sorted
    }
}

fn credentials(conn: &Connection) -> Result<Credentials, Box<dyn std::error::Error>> {
    let key = conn.key.as_deref().ok_or("missing --key (or IPS_KEY_PATH)")?;
    let cert = conn.cert.as_deref().ok_or("missing --cert (or IPS_CERT_PATH)")?;
    Ok(Credentials::from_files(key, cert)?)
}

fn client(conn: &Connection) -> Result<ApiClient, Box<dyn std::error::Error>> {
    Ok(ApiClient::connect(config(conn)?, credentials(conn)?)?)
}

fn config(conn: &Connection) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let api_root = conn.api_root.as_deref().ok_or("missing --api-root (or IPS_API_ROOT)")?;
    let participant = conn
        .participant
        .as_deref()
        .ok_or("missing --participant (or IPS_PARTICIPANT_ID)")?;
    let config = ClientConfig::new(api_root, participant)
        .with_timeout(Duration::from_secs(conn.timeout))
        .with_connect_timeout(Duration::from_secs(conn.connect_timeout))
        .with_query_canonicalization(query_mode(conn));
    Ok(config)
}

fn print_collection(collection: &MessageCollection) -> CliResult {
    println!("{}", serde_json::to_string_pretty(collection)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(args: &[&str]) -> ClientConfig {
        let mut argv = vec!["ips", "--api-root", "https://ips.example", "--participant", "BANKLV22"];
        argv.extend_from_slice(args);
        argv.push("outbox");
        config(&Cli::try_parse_from(argv).unwrap().conn).unwrap()
    }

    // Single test: it mutates the process environment.
    #[test]
    fn connection_settings_follow_flags_and_environment() {
        std::env::remove_var("IPS_SIGN_QUERY");
        std::env::remove_var("IPS_CONNECT_TIMEOUT_SECS");

        let cfg = config_for(&[]);
        assert_eq!(cfg.query_canonicalization, QueryCanonicalization::Sorted);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(10));

        let cfg = config_for(&["--sign-query", "false", "--connect-timeout", "3"]);
        assert_eq!(cfg.query_canonicalization, QueryCanonicalization::Omitted);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(3));

        let cfg = config_for(&["--legacy-query"]);
        assert_eq!(cfg.query_canonicalization, QueryCanonicalization::Omitted);

        std::env::set_var("IPS_SIGN_QUERY", "false");
        std::env::set_var("IPS_CONNECT_TIMEOUT_SECS", "4");
        let cfg = config_for(&[]);
        assert_eq!(cfg.query_canonicalization, QueryCanonicalization::Omitted);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(4));

        let cfg = config_for(&["--sign-query", "true"]);
        assert_eq!(cfg.query_canonicalization, QueryCanonicalization::Sorted);

        std::env::remove_var("IPS_SIGN_QUERY");
        std::env::remove_var("IPS_CONNECT_TIMEOUT_SECS");
    }
}
