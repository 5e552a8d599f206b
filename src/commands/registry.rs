//! Patient registry, history and dashboard listings.

use chrono::Local;

use super::AppContext;
use crate::models::{Gender, NewPatient};

pub async fn list_patients(ctx: &AppContext) -> Result<(), String> {
    let patients = ctx
        .client
        .list_patients(&ctx.session)
        .await
        .map_err(|e| ctx.fail(e))?;

    let tr = ctx.tr();
    if patients.is_empty() {
        println!("{}", tr.t("cli.no_patients"));
        return Ok(());
    }
    for p in &patients {
        let age = p
            .age
            .map(|a| tr.t_count("report.age_value", u64::from(a)))
            .unwrap_or_else(|| tr.t("report.not_available"));
        println!("{:>6}  {:<30}  {:<10}  {}", p.id, p.full_name, tr.gender_label(p.gender), age);
    }
    Ok(())
}

pub async fn add_patient(
    ctx: &AppContext,
    full_name: String,
    age: Option<u32>,
    gender: Gender,
    phone: Option<String>,
) -> Result<(), String> {
    let patient = NewPatient {
        full_name,
        age,
        gender,
        phone,
    };
    let created = ctx
        .client
        .create_patient(&ctx.session, &patient)
        .await
        .map_err(|e| ctx.fail(e))?;

    let message = ctx.tr().t("cli.patient_created");
    match created {
        Some(p) => println!("{message} ({})", p.id),
        None => println!("{message}"),
    }
    Ok(())
}

pub async fn history(ctx: &AppContext) -> Result<(), String> {
    let entries = ctx
        .client
        .history(&ctx.session)
        .await
        .map_err(|e| ctx.fail(e))?;

    let tr = ctx.tr();
    println!("{}", tr.t_count("history.count", entries.len() as u64));
    for entry in &entries {
        let date = tr.format_datetime(entry.timestamp.with_timezone(&Local).naive_local());
        let mut line = format!(
            "{:>6}  {}  {:<24}  {} ({:.1}%)",
            entry.id,
            date,
            entry.patient_name.as_deref().unwrap_or("-"),
            tr.classification_label(entry.classification()),
            entry.confidence_percent(),
        );
        if let Some(name) = entry.display_filename() {
            line.push_str(&format!("  {name}"));
        }
        if entry.is_expired {
            line.push_str(&format!("  [{}]", tr.t("history.expired")));
        }
        println!("{line}");
    }
    Ok(())
}

pub async fn stats(ctx: &AppContext) -> Result<(), String> {
    let stats = ctx
        .client
        .dashboard_stats(&ctx.session)
        .await
        .map_err(|e| ctx.fail(e))?;

    let tr = ctx.tr();
    let prevalence = format!("{:.1}", stats.prevalence_percent());
    println!("{}: {}", tr.t("dashboard.patients"), stats.total_patients);
    println!("{}: {}", tr.t("dashboard.analyses"), stats.total_analyses);
    println!("{}: {}", tr.t("dashboard.glaucoma"), stats.total_glaucoma);
    println!("{}", tr.t_with("dashboard.prevalence", &[("value", prevalence.as_str())]));
    for p in &stats.recent_patients {
        println!("  {:>6}  {}", p.id, p.full_name);
    }
    Ok(())
}
