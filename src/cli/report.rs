use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use ansi_term::{Colour, Style};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, SubsecRound};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};
use now::DateTimeNow;

use crate::{
    export::{
        csv::{detailed_to_csv, summary_to_csv, weekly_table, weekly_to_csv},
        pdf::{detailed_to_pdf, summary_table, summary_to_pdf, PdfHeader},
    },
    model::{entities::EntityId, filter::ReportFilter},
    report::{
        dashboard::Dashboard,
        detailed::{group_by_day, DetailedRow},
        summary::GroupBy,
    },
    utils::time::{date_key, format_duration, local_now, DateRange},
};

use super::{AppContext, Args};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportKind {
    Summary,
    Detailed,
    Weekly,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Grouping {
    Project,
    Client,
    Day,
}

impl From<Grouping> for GroupBy {
    fn from(value: Grouping) -> Self {
        match value {
            Grouping::Project => GroupBy::Project,
            Grouping::Client => GroupBy::Client,
            Grouping::Day => GroupBy::Day,
        }
    }
}

#[derive(Debug, clap::Args)]
pub(crate) struct ReportCommand {
    #[arg(value_enum, default_value = "summary")]
    kind: ReportKind,
    #[arg(long, value_enum, default_value = "project", help = "Grouping of the summary report")]
    by: Grouping,
    #[arg(
        long = "start",
        short,
        help = "First day of the range. Examples are \"yesterday\", \"last monday\", \"15/03/2025\". Defaults to the start of the current week"
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "Last day of the range, included as a whole. Defaults to the end of the current week, or today when only start is given"
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(short, long = "project", help = "Only these projects, may be repeated")]
    projects: Vec<EntityId>,
    #[arg(short, long = "client", help = "Only projects of these clients, may be repeated")]
    clients: Vec<EntityId>,
    #[arg(short, long = "tag", help = "Only entries carrying any of these tags, may be repeated")]
    tags: Vec<EntityId>,
    #[arg(long, help = "Only billable entries")]
    billable_only: bool,
    #[arg(long, help = "Print CSV instead of a table")]
    csv: bool,
    #[arg(short, long, help = "Write CSV into this file")]
    output: Option<PathBuf>,
    #[arg(
        long,
        conflicts_with_all = ["csv", "output"],
        help = "Write the summary or detailed report as PDF into this file"
    )]
    pdf: Option<PathBuf>,
}

fn validation_error(message: String) -> anyhow::Error {
    Args::command()
        .error(clap::error::ErrorKind::ValueValidation, message)
        .into()
}

/// Turns the user's loose dates into whole days. Without a start the current week is used.
fn parse_range(
    start_date: Option<&str>,
    end_date: Option<&str>,
    date_style: DateStyle,
    now: DateTime<Local>,
) -> Result<DateRange> {
    let dialect: chrono_english::Dialect = date_style.into();
    let parse = |value: &str, name: &str| {
        parse_date_string(value, now, dialect)
            .map(|v| v.with_timezone(&Local))
            .map_err(|e| validation_error(format!("Failed to validate {name} date {e}")))
    };

    let (start, end) = match (start_date, end_date) {
        (None, None) => return Ok(DateRange::week(now.naive_local())),
        (Some(start), None) => (parse(start, "start")?, now),
        (None, Some(end)) => {
            let end = parse(end, "end")?;
            return Ok(DateRange::week(end.naive_local()));
        }
        (Some(start), Some(end)) => (parse(start, "start")?, parse(end, "end")?),
    };
    let range = DateRange::new(
        start.beginning_of_day().naive_local(),
        end.end_of_day().naive_local().trunc_subsecs(0),
    );
    if range.start > range.end {
        return Err(validation_error(format!(
            "Start {} is after end {}",
            date_key(range.start.date()),
            date_key(range.end.date())
        )));
    }
    Ok(range)
}

async fn write_pdf(path: &Path, bytes: Vec<u8>) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write PDF to {path:?}"))?;
    println!("Saved report to {}", path.display());
    Ok(())
}

pub(crate) async fn process_report_command(
    context: &AppContext,
    ReportCommand {
        kind,
        by,
        start_date,
        end_date,
        date_style,
        projects,
        clients,
        tags,
        billable_only,
        csv,
        output,
        pdf,
    }: ReportCommand,
) -> Result<()> {
    let range = parse_range(
        start_date.as_deref(),
        end_date.as_deref(),
        date_style,
        Local::now(),
    )?;
    let filter = ReportFilter::default()
        .with_projects(projects)
        .with_clients(clients)
        .with_tags(tags)
        .billable_only(billable_only);
    let reports = context.reports();
    let as_csv = csv || output.is_some();
    let header = |title: String| PdfHeader::new(title, &range, &filter, local_now());

    let text = match kind {
        ReportKind::Summary => {
            let by: GroupBy = by.into();
            let groups = reports.summary(&range, &filter, by).await?;
            if let Some(path) = pdf {
                let title = format!("Summary Report by {}", by.label());
                return write_pdf(&path, summary_to_pdf(&groups, by.label(), &header(title))?)
                    .await;
            }
            if as_csv {
                summary_to_csv(&groups, by.label())
            } else {
                print_range(&range);
                if groups.is_empty() {
                    println!("Nothing tracked");
                } else {
                    print_lines(summary_table(&groups, by.label()).into_lines());
                }
                return Ok(());
            }
        }
        ReportKind::Detailed => {
            let rows = reports.detailed(&range, &filter).await?;
            if let Some(path) = pdf {
                let bytes = detailed_to_pdf(&rows, &header("Detailed Report".to_string()))?;
                return write_pdf(&path, bytes).await;
            }
            if as_csv {
                detailed_to_csv(&rows)
            } else {
                print_detailed(&range, rows);
                return Ok(());
            }
        }
        ReportKind::Weekly => {
            if pdf.is_some() {
                return Err(validation_error(
                    "The weekly report has no PDF layout, use --csv".to_string(),
                ));
            }
            let rows = reports.weekly(&range, &filter).await?;
            if as_csv {
                weekly_to_csv(&rows)
            } else {
                print_range(&range);
                if rows.is_empty() {
                    println!("Nothing tracked");
                } else {
                    print_lines(weekly_table(&rows));
                }
                return Ok(());
            }
        }
    };

    match output {
        Some(path) => {
            tokio::fs::write(&path, text).await?;
            println!("Saved report to {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn print_range(range: &DateRange) {
    println!(
        "{}",
        Style::new().bold().paint(format!(
            "{} - {}",
            date_key(range.start.date()),
            date_key(range.end.date())
        ))
    );
}

/// Tab separated, the last line is the bold TOTAL line.
fn print_lines(lines: Vec<Vec<String>>) {
    let count = lines.len();
    for (index, cells) in lines.into_iter().enumerate() {
        let text = cells.join("\t");
        if index + 1 == count {
            println!("{}", Style::new().bold().paint(text));
        } else {
            println!("{text}");
        }
    }
}

fn print_detailed(range: &DateRange, rows: Vec<DetailedRow>) {
    print_range(range);
    if rows.is_empty() {
        println!("Nothing tracked");
        return;
    }
    for day in group_by_day(rows) {
        println!(
            "{}\t{}",
            Colour::Cyan.paint(date_key(day.date)),
            format_duration(day.total_seconds as f64)
        );
        for row in day.rows {
            let tags = row
                .tags
                .iter()
                .map(|t| format!("#{}", t.name))
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "  {}-{}\t{}\t{}\t{}\t{tags}",
                row.start_time.format("%H:%M"),
                row.stop_time.format("%H:%M"),
                format_duration(row.duration_seconds as f64),
                row.project_name.as_deref().unwrap_or("-"),
                row.description
            );
        }
    }
}

pub(crate) async fn process_dashboard_command(
    context: &AppContext,
    recent: usize,
    json: bool,
) -> Result<()> {
    let working_hours = context.settings().working_hours().await?;
    let dashboard = context
        .reports()
        .dashboard(local_now(), working_hours, recent)
        .await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
    } else {
        print_dashboard(&dashboard);
    }
    Ok(())
}

fn print_dashboard(dashboard: &Dashboard) {
    let bold = Style::new().bold();
    println!(
        "{}\t{}\t{} of the working day",
        bold.paint("Today"),
        format_duration(dashboard.today_running_seconds as f64),
        dashboard.capacity
    );
    println!(
        "{}\t{}",
        bold.paint("Week"),
        format_duration(dashboard.week_seconds as f64)
    );
    println!(
        "{}\t{}",
        bold.paint("Month"),
        format_duration(dashboard.month_seconds as f64)
    );
    if let Some(project) = &dashboard.most_tracked_project {
        println!(
            "{}\t{} ({:.2}h this week)",
            bold.paint("Top project"),
            project.project_name,
            project.hours
        );
    }

    println!();
    for day in &dashboard.last_7_days {
        let bar = "#".repeat((day.hours * 2.).round() as usize);
        println!(
            "{}\t{:>5.2}h\t{}",
            date_key(day.date),
            day.hours,
            Colour::Blue.paint(bar)
        );
    }

    if !dashboard.recent_entries.is_empty() {
        println!();
        println!("{}", bold.paint("Recent"));
        for entry in &dashboard.recent_entries {
            println!(
                "{}\t{}\t{}\t{}",
                entry.start_time.format("%x %H:%M"),
                format_duration(entry.duration_seconds as f64),
                entry.project_name,
                entry.description
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, TimeZone};

    use clap::Parser;

    use super::*;
    use crate::{cli::Commands, utils::time::parse_timestamp};

    fn now() -> DateTime<Local> {
        // Wednesday
        Local
            .from_local_datetime(&parse_timestamp("2025-03-19T14:30:00").unwrap())
            .single()
            .unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_range_is_current_week() -> Result<()> {
        let range = parse_range(None, None, DateStyle::Uk, now())?;
        assert_eq!(range, DateRange::days(day(2025, 3, 17), day(2025, 3, 23)));
        Ok(())
    }

    #[test]
    fn test_explicit_days_are_whole() -> Result<()> {
        let range = parse_range(Some("15/03/2025"), Some("16/03/2025"), DateStyle::Uk, now())?;
        assert_eq!(range, DateRange::days(day(2025, 3, 15), day(2025, 3, 16)));

        let range = parse_range(Some("03/15/2025"), None, DateStyle::Us, now())?;
        assert_eq!(range, DateRange::days(day(2025, 3, 15), day(2025, 3, 19)));
        Ok(())
    }

    fn report_command(args: &[&str]) -> Result<ReportCommand> {
        let args = Args::try_parse_from(["timeflow", "report"].iter().chain(args))?;
        match args.commands {
            Commands::Report { command } => Ok(command),
            other => anyhow::bail!("Parsed {other:?}"),
        }
    }

    #[test]
    fn test_pdf_flag() -> Result<()> {
        let command = report_command(&["detailed", "--pdf", "week.pdf"])?;
        assert!(matches!(command.kind, ReportKind::Detailed));
        assert_eq!(command.pdf, Some(PathBuf::from("week.pdf")));

        assert!(report_command(&["summary", "--pdf", "week.pdf", "--csv"]).is_err());
        assert!(report_command(&["summary", "--pdf", "a.pdf", "--output", "a.csv"]).is_err());
        Ok(())
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        assert!(parse_range(Some("16/03/2025"), Some("15/03/2025"), DateStyle::Uk, now()).is_err());
        assert!(parse_range(Some("not a date"), None, DateStyle::Uk, now()).is_err());
    }
}
