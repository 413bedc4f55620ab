//! Interzept CLI
//!
//! CLI tool for compiling rule exports into platform rulesets, previewing
//! matches, and running the background service locally.

mod serve;

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;

use iz_compiler::reconciler::SkippedRule;
use iz_compiler::{import_rules, skip_reason, ImportReport, PlatformRule, Reconciler};
use iz_core::pattern::CompiledPattern;
use iz_core::templates::{new_override_rule, template, TEMPLATES};
use iz_core::types::{Rule, RuleType};
use iz_core::url::decode_data_url;
use iz_core::Dispatcher;
use iz_service::ServiceConfig;

use crate::serve::{run_serve, ServeOptions};

#[derive(Parser)]
#[command(name = "iz-cli")]
#[command(about = "Interzept rule compiler and tools")]
struct Cli {
    /// Service configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn get_level_filter(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a rule export into a platform ruleset
    Compile {
        /// Rule export file
        #[arg(short, long)]
        input: String,

        /// Output ruleset file
        #[arg(short, long, default_value = "ruleset.json")]
        output: String,

        /// Also redirect main_frame and sub_frame loads
        #[arg(long)]
        include_frames: bool,
    },

    /// Validate a rule export
    Validate {
        /// Rule export file
        #[arg(short, long)]
        input: String,
    },

    /// Show which rules fire for a URL
    Match {
        /// Rule export file
        #[arg(short, long)]
        input: String,

        /// Request URL
        #[arg(short, long)]
        url: String,

        /// Only rules of this type (overrides, redirect, headers)
        #[arg(short = 't', long = "type")]
        rule_type: Option<String>,
    },

    /// Dump ruleset info
    Info {
        /// Ruleset file to inspect
        #[arg(short, long)]
        input: String,
    },

    /// Print a new rule, optionally from a template
    New {
        /// Rule id
        #[arg(long, default_value = "1")]
        id: String,

        /// Template id
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Run the background service on stdin/stdout
    Serve {
        /// Storage file
        #[arg(short, long, default_value = "interzept-storage.json")]
        storage: PathBuf,

        /// Installed ruleset file
        #[arg(short, long, default_value = "dynamic-rules.json")]
        ruleset: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Library crates log through `log`; the subscriber bridges those records.
    let result = tracing_subscriber::fmt()
        .with_max_level(cli.get_level_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| e.to_string())
        .and_then(|()| load_config(cli.config.as_deref()))
        .and_then(|config| match cli.command {
            Commands::Compile {
                input,
                output,
                include_frames,
            } => cmd_compile(&input, &output, include_frames, &config),
            Commands::Validate { input } => cmd_validate(&input),
            Commands::Match { input, url, rule_type } => cmd_match(&input, &url, rule_type.as_deref()),
            Commands::Info { input } => cmd_info(&input),
            Commands::New { id, template } => cmd_new(&id, template.as_deref()),
            Commands::Serve { storage, ruleset } => run_serve(ServeOptions {
                storage,
                ruleset,
                config,
            }),
        });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig, String> {
    match path {
        Some(path) => ServiceConfig::from_file(path).map_err(|e| e.to_string()),
        None => Ok(ServiceConfig::default()),
    }
}

fn read_rules(path: &str) -> Result<ImportReport, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    let report = import_rules(&content).map_err(|e| format!("Invalid rule export '{}': {}", path, e))?;
    if report.discarded > 0 {
        log::warn!("{} entries in '{}' were discarded", report.discarded, path);
    }
    Ok(report)
}

/// Compiled ruleset plus the rules left out of it.
struct Compiled {
    rules: Vec<PlatformRule>,
    skipped: Vec<SkippedRule>,
}

fn compile(report: &ImportReport, config: &ServiceConfig, include_frames: bool) -> Result<Compiled, String> {
    let mut config = config.clone();
    config.include_frames |= include_frames;

    let reconciler = Reconciler::new(config.id_range().map_err(|e| e.to_string())?, config.translate_options());
    let plan = reconciler
        .reconcile(&report.rules, &BTreeSet::new(), &HashSet::new())
        .map_err(|e| e.to_string())?;

    Ok(Compiled {
        rules: plan.to_add,
        skipped: plan.skipped,
    })
}

fn cmd_compile(input: &str, output: &str, include_frames: bool, config: &ServiceConfig) -> Result<(), String> {
    let report = read_rules(input)?;
    let compiled = compile(&report, config, include_frames)?;

    let json = serde_json::to_string_pretty(&compiled.rules).map_err(|e| format!("Failed to encode ruleset: {}", e))?;
    fs::write(output, json).map_err(|e| format!("Failed to write '{}': {}", output, e))?;

    println!("Compiled '{}' to '{}'", input, output);
    println!("  Rules:     {}", report.imported_count);
    println!("  Installed: {}", compiled.rules.len());
    println!("  Skipped:   {}", compiled.skipped.len());
    for skipped in &compiled.skipped {
        println!("    {} - {}", skipped.rule_id, skipped.reason);
    }

    Ok(())
}

fn cmd_validate(input: &str) -> Result<(), String> {
    let report = read_rules(input)?;

    for rule in unmatchable(&report.rules) {
        log::warn!("rule '{}' source '{}' can never match", rule.id, rule.source);
    }

    println!("Rule export '{}' is valid", input);
    println!("  Rules:      {}", report.imported_count);
    println!("  Discarded:  {}", report.discarded);
    for rule in &report.rules {
        match skip_reason(rule) {
            Some(reason) => println!("  [skip] {} ({}) - {}", rule.id, rule.name, reason),
            None => println!("  [ok]   {} ({}) {}", rule.id, rule.name, rule.source),
        }
    }

    Ok(())
}

/// Rules whose source compiles to nothing that can match a URL.
fn unmatchable(rules: &[Rule]) -> Vec<&Rule> {
    rules
        .iter()
        .filter(|rule| !CompiledPattern::new(&rule.source).is_valid())
        .collect()
}

fn cmd_match(input: &str, url: &str, rule_type: Option<&str>) -> Result<(), String> {
    let rule_type = match rule_type {
        Some(name) => Some(RuleType::from_name(name).ok_or_else(|| format!("Unknown rule type '{}'", name))?),
        None => None,
    };
    let report = read_rules(input)?;

    let dispatcher = Dispatcher::new();
    let matching = dispatcher.find_matching_rules(&report.rules, url, rule_type);
    log::debug!("compiled {} patterns", dispatcher.cached_patterns());
    if matching.is_empty() {
        println!("No rules match '{}'", url);
        return Ok(());
    }

    println!("{} rules match '{}':", matching.len(), url);
    for (position, rule) in matching.iter().enumerate() {
        println!("  {}. {} ({}) [{}] {}", position + 1, rule.id, rule.name, rule.rule_type, rule.source);
    }
    if let Some(hit) = matching.iter().find(|r| r.rule_type == RuleType::Overrides) {
        println!();
        println!("Response: {} {}", hit.response_code(), hit.content_type());
        println!("{}", hit.response_body());
    }

    Ok(())
}

fn cmd_info(input: &str) -> Result<(), String> {
    let content = fs::read_to_string(input).map_err(|e| format!("Failed to read '{}': {}", input, e))?;
    let rules: Vec<PlatformRule> =
        serde_json::from_str(&content).map_err(|e| format!("Invalid ruleset '{}': {}", input, e))?;

    println!("Ruleset: {}", input);
    println!("  Rules:       {}", rules.len());
    if let (Some(min), Some(max)) = (rules.iter().map(|r| r.id).min(), rules.iter().map(|r| r.id).max()) {
        println!("  ID span:     {}..={}", min, max);
    }
    println!();

    for rule in &rules {
        println!(
            "  #{} priority {} {} [{}]",
            rule.id,
            rule.priority,
            rule.condition.url_filter,
            rule.condition.resource_types.join(", ")
        );
        match rule.redirect_url().and_then(decode_data_url) {
            Some((media_type, body)) => println!("      {} body, {} bytes", media_type, body.len()),
            None => println!("      (no data redirect)"),
        }
    }

    Ok(())
}

fn cmd_new(id: &str, template_id: Option<&str>) -> Result<(), String> {
    let rule = match template_id {
        Some(t) => template(t)
            .ok_or_else(|| {
                let known: Vec<&str> = TEMPLATES.iter().map(|t| t.id).collect();
                format!("Unknown template '{}' (known: {})", t, known.join(", "))
            })?
            .to_rule(id),
        None => new_override_rule(id),
    };
    let json = serde_json::to_string_pretty(&rule).map_err(|e| format!("Failed to encode rule: {}", e))?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"[
        {"id": "1", "name": "Users", "type": "overrides", "enabled": true, "source": "https://api.test/users"},
        {"id": "2", "name": "Off", "type": "overrides", "enabled": false, "source": "*/off"},
        {"id": "3", "name": "Broken"}
    ]"#;

    #[test]
    fn test_compile_export() {
        let report = import_rules(EXPORT).unwrap();
        let compiled = compile(&report, &ServiceConfig::default(), false).unwrap();
        assert_eq!(compiled.rules.len(), 1);
        assert_eq!(compiled.rules[0].condition.url_filter, "|https://api.test/users|");
        assert_eq!(compiled.skipped.len(), 1);

        let framed = compile(&report, &ServiceConfig::default(), true).unwrap();
        assert_eq!(
            framed.rules[0].condition.resource_types,
            ["xmlhttprequest", "main_frame", "sub_frame"]
        );
    }

    #[test]
    fn test_compile_and_info_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rules.json");
        let output = dir.path().join("ruleset.json");
        fs::write(&input, EXPORT).unwrap();

        cmd_compile(
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            false,
            &ServiceConfig::default(),
        )
        .unwrap();
        let rules: Vec<PlatformRule> = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(rules[0].id, 1000);
        assert!(cmd_info(output.to_str().unwrap()).is_ok());
    }

    #[test]
    fn test_unmatchable_sources() {
        let report = import_rules(
            r#"[
                {"id": "1", "name": "Users", "type": "overrides", "enabled": true, "source": "https://api.test/users"},
                {"id": "2", "name": "Blank", "type": "overrides", "enabled": true, "source": ""}
            ]"#,
        )
        .unwrap();
        let ids: Vec<&str> = unmatchable(&report.rules).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["2"]);
    }

    #[test]
    fn test_verbose_level() {
        let cli = Cli::parse_from(["iz-cli", "--verbose", "validate", "--input", "rules.json"]);
        assert_eq!(cli.get_level_filter(), LevelFilter::DEBUG);
        let cli = Cli::parse_from(["iz-cli", "validate", "--input", "rules.json"]);
        assert_eq!(cli.get_level_filter(), LevelFilter::INFO);
    }

    #[test]
    fn test_command_errors() {
        assert!(cmd_validate("/nonexistent/rules.json").is_err());
        assert!(cmd_new("1", Some("nope")).is_err());
        assert!(cmd_new("1", Some("api-mock")).is_ok());
        assert!(load_config(Some(Path::new("/nonexistent/config.json"))).is_err());
    }
}
