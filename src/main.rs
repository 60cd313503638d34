//! SSR Prerender CLI
//!
//! Single-shot mode:
//!   ssr-prerender [options] <root> <url>
//!
//! Server mode (persistent process, reads from stdin):
//!   ssr-prerender [options] --server <root>
//!
//! Options:
//!   --timeout <ms>      render timeout (default 5000)
//!   --index <file>      shell file inside root (default index.html)
//!   --no-cache          render every request
//!   --disk-cache <dir>  cache rendered pages as files under <dir>
//!
//! Options are also read from `ssr.json`, then `.ssr.json`, in the working
//! directory; command line flags win.
//!
//! Protocol (server mode):
//!   Request (stdin), one URL per line:
//!     http://localhost:8000/about
//!
//!   Response (stdout):
//!     Status:Ok
//!     Length:1234
//!
//!     <!DOCTYPE html>...
//!
//!   Error response:
//!     Status:Error
//!     Length:42
//!
//!     Render timed out (5s), `window.onModulesLoaded` was never called.

use anyhow::{anyhow, Context, Result};
use ssr_prerender::config::{CacheSetting, DiskCacheSetting};
use ssr_prerender::{Renderer, RequestContext, SsrOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!("SSR Prerender - render a static shell's scripts to HTML");
    eprintln!();
    eprintln!("Single-shot mode:");
    eprintln!("  ssr-prerender [options] <root> <url>");
    eprintln!();
    eprintln!("Server mode (persistent process):");
    eprintln!("  ssr-prerender [options] --server <root>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --timeout <ms>      render timeout in milliseconds (default 5000)");
    eprintln!("  --index <file>      shell file inside root (default index.html)");
    eprintln!("  --no-cache          disable the page cache");
    eprintln!("  --disk-cache <dir>  cache rendered pages on disk");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  ssr-prerender ./build http://localhost:8000/about");
    eprintln!("  ssr-prerender --timeout 2000 --server ./build");
}

#[derive(Debug, Default)]
struct Args {
    server: bool,
    positional: Vec<String>,
    options: SsrOptions,
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let mut args = Args::default();
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} requires a value", flag))
        };
        match arg.as_str() {
            "--server" => args.server = true,
            "--no-cache" => args.options.cache = Some(CacheSetting::Enabled(false)),
            "--timeout" => {
                let ms = value("--timeout")?;
                args.options.timeout = Some(ms.parse().with_context(|| format!("invalid --timeout '{}'", ms))?);
            }
            "--index" => args.options.index = Some(value("--index")?),
            "--disk-cache" => {
                args.options.cache = Some(CacheSetting::Disk(DiskCacheSetting {
                    dir: Some(PathBuf::from(value("--disk-cache")?)),
                    invalidate_previous: false,
                }))
            }
            flag if flag.starts_with("--") => return Err(anyhow!("unknown option {}", flag)),
            _ => args.positional.push(arg.clone()),
        }
    }
    Ok(args)
}

/// `ssr.json`, then `.ssr.json`, then the command line.
fn load_options(cwd: &Path, cli: SsrOptions) -> Result<SsrOptions> {
    let mut options = SsrOptions::default();
    for name in ["ssr.json", ".ssr.json"] {
        if let Some(file) = SsrOptions::from_optional_file(&cwd.join(name))? {
            tracing::debug!(file = name, "loaded config file");
            options = options.merge(file);
        }
    }
    Ok(options.merge(cli))
}

/// Run in single-shot mode
async fn run_single_shot(options: SsrOptions, url: &str) -> Result<()> {
    let renderer = Renderer::new(options.into_builder().build())?;
    let mut ctx = RequestContext::from_url(url)?;
    renderer.handle(&mut ctx).await?;

    // Print HTML to stdout
    println!("{}", ctx.body.unwrap_or_default());

    Ok(())
}

/// Run in server mode (persistent process, reads URLs from stdin)
async fn run_server(options: SsrOptions) -> Result<()> {
    // One renderer for the whole session so the cache and resource memo
    // are shared across requests.
    let renderer = Renderer::new(options.into_builder().build())?;

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let mut reader = stdin.lock();

    tracing::info!("server ready, reading from stdin");

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            // EOF - stdin closed, exit gracefully
            break;
        }
        let url = line.trim();
        if url.is_empty() {
            continue;
        }

        let mut ctx = match RequestContext::from_url(url) {
            Ok(ctx) => ctx,
            Err(e) => {
                write_response(&mut stdout, false, &e.to_string())?;
                continue;
            }
        };

        match renderer.handle(&mut ctx).await {
            Ok(()) => write_response(&mut stdout, true, ctx.body.as_deref().unwrap_or_default())?,
            Err(e) => {
                tracing::warn!(url, error = %e, "render failed");
                write_response(&mut stdout, false, &e.to_string())?;
            }
        }
    }

    tracing::info!("server shutting down");
    Ok(())
}

/// Write response in length-prefixed protocol
fn write_response(stdout: &mut std::io::Stdout, ok: bool, body: &str) -> Result<()> {
    let status = if ok { "Ok" } else { "Error" };

    writeln!(stdout, "Status:{}", status)?;
    writeln!(stdout, "Length:{}", body.len())?;
    writeln!(stdout)?; // Empty line separator
    write!(stdout, "{}", body)?;
    stdout.flush()?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            print_usage();
            return Err(e);
        }
    };

    let mut cli = args.options;
    let expected = if args.server { 1 } else { 2 };
    if args.positional.len() != expected {
        print_usage();
        return Err(anyhow!("Missing required arguments"));
    }
    cli.root = Some(PathBuf::from(&args.positional[0]));

    let options = load_options(&std::env::current_dir()?, cli)?;

    if args.server {
        return run_server(options).await;
    }
    run_single_shot(options, &args.positional[1]).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_flags() {
        let args = parse_args(&strings(&["--timeout", "250", "--no-cache", "--server", "build"])).unwrap();
        assert!(args.server);
        assert_eq!(args.positional, vec!["build"]);
        assert_eq!(args.options.timeout, Some(250));
        assert_eq!(args.options.cache, Some(CacheSetting::Enabled(false)));
    }

    #[test]
    fn test_parse_rejects_unknown_and_incomplete_flags() {
        assert!(parse_args(&strings(&["--port", "80"])).is_err());
        assert!(parse_args(&strings(&["build", "--timeout"])).is_err());
        assert!(parse_args(&strings(&["--timeout", "soon"])).is_err());
    }

    #[test]
    fn test_cli_overrides_config_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ssr.json"), r#"{"timeout": 1000, "index": "app.html"}"#).unwrap();
        std::fs::write(dir.path().join(".ssr.json"), r#"{"timeout": 2000}"#).unwrap();
        let cli = SsrOptions {
            index: Some("shell.html".into()),
            ..SsrOptions::default()
        };
        let merged = load_options(dir.path(), cli).unwrap();
        assert_eq!(merged.timeout, Some(2000));
        assert_eq!(merged.index.as_deref(), Some("shell.html"));
    }
}
