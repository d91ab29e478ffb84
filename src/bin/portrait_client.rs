use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use memorial_portrait_server::{
    client::{ClientOutcome, PortraitClient},
    models::CandidateFile,
    services::{
        face_detector::{DisabledDetector, FaceDetector, HttpFaceDetector},
        intake_validator::{Confirm, FacePolicy, IntakeLimits, IntakeValidator},
    },
    utils::file,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Check a portrait photo locally, upload it and save the generated memorial portrait.
#[derive(Debug, Parser)]
#[command(name = "portrait-client", version)]
struct Args {
    /// Photo to submit
    photo: PathBuf,

    /// Where to write the generated portrait (extension follows the result type)
    #[arg(short, long, default_value = "memorial-portrait")]
    output: PathBuf,

    #[arg(long, env = "PORTRAIT_SERVER_URL", default_value = "http://localhost:3000")]
    server: String,

    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = 5 * 1024 * 1024)]
    max_file_size: u64,

    #[arg(long, env = "MIN_IMAGE_DIMENSION", default_value_t = 512)]
    min_dimension: u32,

    /// Reject photos below the minimum resolution instead of warning
    #[arg(long)]
    strict_resolution: bool,

    /// Reject photos without a detected face instead of asking
    #[arg(long)]
    require_face: bool,

    #[arg(long, env = "FACE_DETECTOR_URL")]
    face_detector_url: Option<String>,

    #[arg(long, env = "FACE_DETECTOR_TIMEOUT_MS", default_value_t = 3000)]
    face_detector_timeout_ms: u64,

    /// Bound on the whole generate request, in seconds
    #[arg(long, default_value_t = 180)]
    timeout_secs: u64,
}

struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm_no_face(&self) -> bool {
        print!("No face was detected in this photo. Continue anyway? [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let detector_timeout = Duration::from_millis(args.face_detector_timeout_ms);
    let detector: Arc<dyn FaceDetector> = match &args.face_detector_url {
        Some(url) => Arc::new(HttpFaceDetector::new(url.clone(), detector_timeout)?),
        None => Arc::new(DisabledDetector),
    };

    let limits = IntakeLimits {
        max_file_size: args.max_file_size,
        min_dimension: args.min_dimension,
        enforce_min_resolution: args.strict_resolution,
        face_policy: if args.require_face {
            FacePolicy::Require
        } else {
            FacePolicy::Prompt
        },
        detector_timeout,
    };

    let client = PortraitClient::new(
        &args.server,
        IntakeValidator::new(limits, detector),
        Duration::from_secs(args.timeout_secs),
    )?;

    let photo = CandidateFile::from_path(&args.photo).await?;
    let outcome = client.run(photo, &StdinConfirm).await?;

    let report = match &outcome {
        ClientOutcome::Rejected(report) | ClientOutcome::Generated { report, .. } => report,
    };
    for warning in &report.warnings {
        eprintln!("warning: {}", warning.message());
    }

    match outcome {
        ClientOutcome::Rejected(report) => {
            eprintln!("{}", report.outcome.message());
            Ok(ExitCode::from(2))
        }
        ClientOutcome::Generated { image, .. } => {
            let extension = file::sniff_format(&image.bytes)
                .map(file::get_file_extension)
                .unwrap_or("img");
            let output = args.output.with_extension(extension);
            tokio::fs::write(&output, &image.bytes).await?;

            println!("Saved memorial portrait to {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}
