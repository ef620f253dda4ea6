use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::TimeDelta;
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{info, warn};

use podprep::library::{BatchRequest, LoftyProbe, PodcastDatabase, get_batch_of_podcast_files, validate_podcast_folders};
use podprep::logging::init_logging;
use podprep::process::{FfmpegProcessor, ProcessJob, ProcessOptions, default_worker_count, process_episodes};
use podprep::settings::{DEFAULT_SETTINGS_FILE, Settings};
use podprep::{
    AdbBridge, LocalBackup, Phone, ProgressEvent, ProgressReporter, SelectedEpisode, SharedProgressReporter,
    format_time_delta, prompt,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "[~] ");
static PHONE: Emoji<'_, '_> = Emoji("📱 ", "[>] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Pick a batch of podcast episodes, prepare them and copy them to the phone
#[derive(Parser, Debug)]
#[command(name = "podprep")]
#[command(about = "Prepare a batch of podcast episodes for the phone")]
#[command(version)]
struct Args {
    /// Path to the JSON settings file
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Select and report, but leave the database, files and phone untouched
    #[arg(long)]
    dry_run: bool,

    /// Log debug output and database chatter
    #[arg(short, long)]
    verbose: bool,
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(spinner_style("{spinner:.green} {wide_msg}"));
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn get_or_create_bar(&self, slot: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(bar) = bars.get(&slot) {
            return bar.clone();
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style(&format!("  {GEAR}{{spinner:.cyan}} {{wide_msg}}")));
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        bars.insert(slot, bar.clone());
        bar
    }

    fn finish_bar(&self, slot: usize) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = bars.remove(&slot) {
            bar.finish_and_clear();
        }
    }
}

fn spinner_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::ProcessingStarting {
                slot,
                show_name,
                file_name,
                episode_index,
                total_to_process,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}Preparing {} episodes",
                    total_to_process.to_string().cyan()
                ));
                let bar = self.get_or_create_bar(slot);
                bar.set_message(format!(
                    "[{}/{}] {} {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_process.to_string().cyan(),
                    show_name.bold(),
                    truncate_title(&file_name, 40)
                ));
            }

            ProgressEvent::ProcessingCompleted { slot, file_name } => {
                self.multi
                    .println(format!("  {SUCCESS}{}", truncate_title(&file_name, 60).green()))
                    .ok();
                self.finish_bar(slot);
            }

            ProgressEvent::ProcessingFailed { slot, file_name, error } => {
                self.multi
                    .println(format!(
                        "  {FAILURE}{} - {}",
                        truncate_title(&file_name, 40).red(),
                        error.red()
                    ))
                    .ok();
                self.finish_bar(slot);
            }

            ProgressEvent::ProcessingFinished {
                processed_count,
                failed_count,
            } => {
                self.main_bar.set_message(format!(
                    "{SUCCESS}Prepared {} episodes, {} failed",
                    processed_count.to_string().green(),
                    colored_count(failed_count)
                ));
            }

            ProgressEvent::TransferStarting { total_to_transfer } => {
                self.main_bar.set_message(format!(
                    "{PHONE}Copying {} files to the phone",
                    total_to_transfer.to_string().cyan()
                ));
            }

            ProgressEvent::FileTransferred { file_name } => {
                self.multi
                    .println(format!("  {PHONE}{}", truncate_title(&file_name, 60).green()))
                    .ok();
            }

            ProgressEvent::TransferFailed { file_name, error } => {
                self.multi
                    .println(format!(
                        "  {FAILURE}{} - {}",
                        truncate_title(&file_name, 40).red(),
                        error.red()
                    ))
                    .ok();
            }

            ProgressEvent::TransferCompleted {
                copied_count,
                failed_count,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} copied, {} failed",
                    "Transfer complete:".bold().green(),
                    copied_count.to_string().green().bold(),
                    colored_count(failed_count)
                );
            }
        }
    }
}

fn colored_count(count: usize) -> colored::ColoredString {
    if count > 0 {
        count.to_string().red().bold()
    } else {
        count.to_string().green()
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let kept: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Yes/no question on the terminal; an unreadable terminal counts as no
fn ask(message: &str) -> bool {
    prompt::yes_or_no(message).unwrap_or_else(|e| {
        warn!("Failed to read answer: {e}");
        false
    })
}

fn read_answer(message: &str) -> String {
    prompt::read_response(message).unwrap_or_else(|e| {
        warn!("Failed to read answer: {e}");
        String::new()
    })
}

fn print_batch(batch: &[SelectedEpisode]) {
    println!("\n{}", "Potential files:".bold());
    for episode in batch {
        let downloaded = episode
            .modified_at()
            .map(|t| format!(", downloaded {}", t.format("%Y-%m-%d")))
            .unwrap_or_default();
        println!(
            "  {}: {} ({}{})",
            episode.show_name.cyan(),
            episode.file_name(),
            format_time_delta(episode.duration).dimmed(),
            downloaded.dimmed()
        );
    }

    let total: TimeDelta = batch.iter().map(|e| e.duration).sum();
    println!(
        "\n{} files in total, duration of {}",
        batch.len().to_string().bold(),
        format_time_delta(total).bold()
    );
}

fn update_database(settings: &Settings, args: &Args) -> Result<PodcastDatabase> {
    let shows = settings.shows();
    validate_podcast_folders(&settings.podcast_folder, &shows).context("Podcast folder has unconfigured shows")?;

    let mut database = PodcastDatabase::new(&settings.podcast_folder, shows, args.verbose)?;
    let database_path = settings.podcast_database();
    database
        .load(&database_path, &mut read_answer)
        .with_context(|| format!("Failed to load database {}", database_path.display()))?;

    database
        .update_podcasts(&LoftyProbe, &mut ask)
        .context("Failed to scan podcast folders")?;

    if args.dry_run {
        info!("Skipping database update for dry run");
    } else {
        database.save(&database_path)?;
        database.update_remaining_time(&settings.podcast_history(), None, &HashSet::new())?;
        database.log_stats(&settings.podcast_stats(), &HashSet::new())?;
    }

    Ok(database)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    println!(
        "\n{}{} {}\n",
        MICROPHONE,
        "podprep".bold().magenta(),
        "- Podcast Batch Preparer".dimmed()
    );

    let settings = Settings::load(&args.settings).context("Failed to load settings")?;
    let database = update_database(&settings, &args)?;

    let phone = Phone::new(
        AdbBridge::new(&settings.android_phone_id),
        settings.podcast_directory_on_phone.to_string_lossy(),
        settings.android_history(),
    );
    phone.connected(&mut ask).await.context("Failed to look for the phone")?;

    let request: BatchRequest = settings.batch_request();
    let batch = get_batch_of_podcast_files(&database, &request, &mut ask, &mut rand::thread_rng())
        .context("Failed to compose a batch")?;
    print_batch(&batch);

    let boarding_zone = &settings.processed_file_boarding_zone_folder;
    if !ask(&format!(
        "Process files and move to '{}' before putting on phone: ",
        boarding_zone.display()
    )) {
        println!("Done.");
        return Ok(());
    }

    std::fs::create_dir_all(boarding_zone)
        .with_context(|| format!("Failed to create {}", boarding_zone.display()))?;

    let jobs: Vec<ProcessJob> = batch
        .iter()
        .map(|episode| ProcessJob::for_episode(episode, boarding_zone, &settings.archive_folder))
        .collect();
    let processed_files: Vec<PathBuf> = jobs.iter().map(|job| job.destination.clone()).collect();

    let reporter: SharedProgressReporter = Arc::new(IndicatifReporter::new());
    let options = ProcessOptions {
        workers: default_worker_count(),
        dry_run: args.dry_run,
    };
    let result = process_episodes(
        Arc::new(FfmpegProcessor::new(args.dry_run)),
        jobs,
        &options,
        reporter.clone(),
    )
    .await
    .context("Failed to prepare episodes")?;

    if !result.failed.is_empty() {
        println!("\n{}", "Failed episodes:".red().bold());
        for (path, error) in &result.failed {
            println!("  {}{} - {}", CROSS, path.display().to_string().yellow(), error.dimmed());
        }
    }

    if args.dry_run {
        info!("Skipping phone transfer for dry run");
        return Ok(());
    }

    if !phone.connected(&mut ask).await? {
        return Ok(());
    }

    let copy_results = phone.copy_files(&processed_files, &reporter).await?;
    let backup = LocalBackup::new(&settings.backup_folder, settings.android_history());

    if !copy_results.failed.is_empty() {
        println!(
            "{}",
            format!("WARNING: NOT ADDING {} FILES TO BACKUP", copy_results.failed.len())
                .red()
                .bold()
        );
        println!(
            "These files weren't copied over successfully and are left alone in {}",
            boarding_zone.display()
        );
    }
    backup
        .move_files_to_backup(&copy_results.copied)
        .context("Failed to move copied files into backup")?;

    match phone.podcast_episodes().await {
        Ok(files_on_phone) => {
            backup
                .remove_unneeded_backup_files(&files_on_phone, &mut ask)
                .context("Failed to prune backup")?;
        }
        Err(e) => {
            warn!("{e}");
            println!("Failed to see android phone, skipping folder back sync");
        }
    }

    Ok(())
}
