use std::error::Error;
use std::io::{self, Write};

use facematch_core::faces::enrollment::{EnrollmentOutcome, SubjectRemoval};
use facematch_core::faces::matcher::MatchDecision;
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputMode;
use crate::doctor::{CheckStatus, DoctorOutcome};
use crate::errors::{AppError, AppResult};
use crate::faces::{CheckOutcome, EncodeOutcome, IdentifyOutcome, ListOutcome};

fn write_json<T: Serialize + ?Sized>(payload: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

pub fn render_check(outcome: &CheckOutcome, mode: OutputMode, _verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => match (&outcome.face_region, &outcome.reason) {
            (Some(region), _) => println!(
                "Quality check passed: {} ({}x{}, face {}x{} at {},{})",
                outcome.image,
                outcome.width,
                outcome.height,
                region.width(),
                region.height(),
                region.left,
                region.top
            ),
            (None, Some(reason)) => {
                println!("Quality check failed: {} ({reason})", outcome.image);
                println!("{}", reason.guidance());
            }
            (None, None) => println!("Quality check failed: {}", outcome.image),
        },
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_encode(outcome: &EncodeOutcome, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!(
                "Encoded {} ({} values, {} mode)",
                outcome.image,
                outcome.encoding.len(),
                if outcome.enrollment_mode {
                    "enrollment"
                } else {
                    "identification"
                }
            );
            if verbose {
                let values: Vec<String> = outcome
                    .encoding
                    .as_slice()
                    .iter()
                    .map(|value| format!("{value:.6}"))
                    .collect();
                println!("{}", values.join(" "));
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_enroll(outcome: &EnrollmentOutcome, mode: OutputMode, verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if verbose {
                for line in &outcome.logs {
                    tracing::info!("{line}");
                }
            }
            println!(
                "Enrollment successful: subject {} added to the {} pool",
                outcome.subject.subject_id, outcome.subject.pool
            );
            println!("Embedding id: {}", outcome.embedding.id);
        }
        OutputMode::Json => write_json(&enroll_json_payload(outcome))?,
    }
    Ok(())
}

fn enroll_json_payload(outcome: &EnrollmentOutcome) -> Value {
    json!({
        "pool": outcome.subject.pool,
        "subject_id": outcome.subject.subject_id,
        "display_name": outcome.subject.display_name,
        "enrolled_at": outcome.subject.enrolled_at,
        "embedding_id": outcome.embedding.id,
        "face_region": outcome.embedding.face_region,
    })
}

pub fn render_identify(outcome: &IdentifyOutcome, mode: OutputMode, _verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => match &outcome.decision {
            MatchDecision::Matched {
                subject_id,
                distance,
                ..
            } => println!(
                "Match: {subject_id} in the {} pool (distance {distance:.4}, tolerance {})",
                outcome.pool, outcome.tolerance
            ),
            MatchDecision::NoMatch => println!(
                "No match in the {} pool within tolerance {}",
                outcome.pool, outcome.tolerance
            ),
        },
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_remove(outcome: &SubjectRemoval, mode: OutputMode, _verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => println!(
            "Removed subject {} from the {} pool ({} embedding(s))",
            outcome.subject_id,
            outcome.pool,
            outcome.removed_embedding_ids.len()
        ),
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_list(outcome: &ListOutcome, mode: OutputMode, _verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for listing in &outcome.pools {
                println!("{} ({} subject(s))", listing.pool, listing.subjects.len());
                for subject in &listing.subjects {
                    match &subject.display_name {
                        Some(name) => println!(
                            "  {} ({name}) enrolled {}",
                            subject.subject_id, subject.enrolled_at
                        ),
                        None => println!("  {} enrolled {}", subject.subject_id, subject.enrolled_at),
                    }
                }
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_doctor(outcome: &DoctorOutcome, mode: OutputMode, _verbose: bool) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for check in &outcome.checks {
                let status = match check.status {
                    CheckStatus::Pass => "PASS",
                    CheckStatus::Warn => "WARN",
                    CheckStatus::Fail => "FAIL",
                };
                let location = check.path.as_deref().or(check.url.as_deref());
                match location {
                    Some(location) => {
                        println!("[{status}] {}: {} ({location})", check.name, check.message)
                    }
                    None => println!("[{status}] {}: {}", check.name, check.message),
                }
            }
            println!("{}", if outcome.ok { "All checks passed" } else { "Some checks failed" });
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {}", source);
            }
        }
        OutputMode::Json => {
            let payload = error_json_payload(err);
            match serde_json::to_string(&payload) {
                Ok(body) => println!("{body}"),
                Err(_) => eprintln!("error: {}", err.human_message()),
            }
        }
    }
}

fn error_json_payload(err: &AppError) -> Value {
    json!({
        "success": false,
        "error": err.human_message(),
        "retryable": err.is_retryable(),
    })
}
