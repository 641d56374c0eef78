use clap::Parser;
use occurrence_hotspots::adapters::country_lookup::CountryTable;
use occurrence_hotspots::app::pipelines::hotspot_pipeline::{CSV_FILE, JSON_FILE, PNG_FILE, TSV_FILE};
use occurrence_hotspots::utils::error::HotspotError;
use occurrence_hotspots::utils::{logger, validation::Validate};
use occurrence_hotspots::{CliArgs, EtlEngine, HotspotConfig, HotspotPipeline, LocalStorage};

fn report_failure(stage: &str, e: &HotspotError) -> ! {
    tracing::error!(
        "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    std::process::exit(e.severity().exit_code().max(1));
}

/// 只印出將要執行的查詢，不發出任何請求
fn print_dry_run(config: &HotspotConfig) {
    let country = config.country().unwrap_or_default();
    let resolved = match CountryTable::embedded() {
        Ok(table) => match table.resolve(country) {
            Ok(c) => format!("{} ({} / {})", c.name, c.iso2, c.iso3),
            Err(e) => format!("unresolved: {}", e),
        },
        Err(e) => format!("unresolved: {}", e),
    };

    println!("🔍 Dry run - nothing will be downloaded");
    println!("  Species:     {}", config.scientific_name().unwrap_or_default());
    println!("  Country:     {} -> {}", country, resolved);
    println!(
        "  Years:       {}-{}",
        config.query.year_start, config.query.year_end
    );
    println!("  Limit:       {}", config.query.limit);
    println!("  Occurrences: {}", config.source.endpoint);
    match &config.boundary.file {
        Some(file) => println!("  Boundary:    {}", file),
        None => println!(
            "  Boundary:    {}/{} ADM{}",
            config.boundary.endpoint, config.boundary.release, config.boundary.level
        ),
    }
    match config.projection.utm_zone {
        Some(zone) => println!("  UTM zone:    {}", zone),
        None => println!("  UTM zone:    from boundary centroid"),
    }
    println!("  Output:      {}", config.output_path());
    let artifacts: Vec<&str> = [
        ("png", PNG_FILE),
        ("csv", CSV_FILE),
        ("tsv", TSV_FILE),
        ("json", JSON_FILE),
    ]
    .into_iter()
    .filter(|(format, _)| config.wants_format(format))
    .map(|(_, file)| file)
    .collect();
    println!("  Artifacts:   {}", artifacts.join(", "));
    if let Some(compression) = config.compression() {
        println!("  Archive:     {}", compression.filename);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("Starting hotspots CLI");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => report_failure("Loading configuration", &e),
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        report_failure("Configuration validation", &e);
    }

    if args.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    let monitor_enabled = args.monitor_enabled(&config);
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path());
    let inputs = LocalStorage::new(".");
    let pipeline = match HotspotPipeline::new(storage, inputs, config) {
        Ok(pipeline) => pipeline,
        Err(e) => report_failure("Creating pipeline", &e),
    };

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Hotspot maps completed successfully!");
            println!("✅ Hotspot maps completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => report_failure("Hotspot run", &e),
    }

    Ok(())
}
