use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::time::Duration;
use url_summary::{
    log_error_card, log_preview_card, setup_logging, FetcherConfig, LogConfig, SummarizeOptions,
    Summarizer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let matches = Command::new("url-summary")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Print link-preview summaries as JSON")
        .arg(
            Arg::new("urls")
                .help("URLs to summarize")
                .required(true)
                .num_args(1..),
        )
        .arg(
            Arg::new("lang")
                .short('l')
                .long("lang")
                .help("Preferred language, sent as Accept-Language")
                .value_name("LANG"),
        )
        .arg(
            Arg::new("no-follow")
                .long("no-follow")
                .help("Do not trace redirects before fetching")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("allow-private")
                .long("allow-private")
                .help("Allow private and loopback addresses (testing only)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .help("Request timeout in seconds")
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .help("Also write logs to daily files in this directory")
                .value_name("DIR"),
        )
        .get_matches();

    let log_dir = matches.get_one::<String>("log-dir");
    setup_logging(LogConfig {
        file_output: log_dir.is_some(),
        log_dir: log_dir.map(Into::into).unwrap_or_else(|| "logs".into()),
        ..LogConfig::default()
    })?;

    let mut config = FetcherConfig::from_env();
    if matches.get_flag("allow-private") {
        config = config.with_allow_private_ip(true);
    }
    if let Some(secs) = matches.get_one::<u64>("timeout") {
        config = config.with_timeout(Duration::from_secs(*secs));
    }

    let mut options = SummarizeOptions::default()
        .with_config(config)
        .with_follow_redirects(!matches.get_flag("no-follow"));
    if let Some(lang) = matches.get_one::<String>("lang") {
        options = options.with_lang(lang.clone());
    }

    let summarizer = Summarizer::new(options)?;
    let urls: Vec<&str> = matches
        .get_many::<String>("urls")
        .map(|values| values.map(String::as_str).collect())
        .unwrap_or_default();

    let results = summarizer.summarize_batch(&urls).await;
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(preview) => {
                log_preview_card(&preview);
                println!("{}", serde_json::to_string_pretty(&preview)?);
            }
            Err(e) => log_error_card(url, &e),
        }
    }

    Ok(())
}
