//! Printable summary and detailed reports. Reports are laid out as [PdfTable]s first and then
//! drawn with the builtin Helvetica fonts, so no font files are needed.

use anyhow::Result;
use chrono::NaiveDateTime;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use crate::{
    model::filter::ReportFilter,
    report::{billing::round2, detailed::DetailedRow, summary::SummaryGroup},
    utils::time::{date_key, format_duration, DateRange},
};

const MARGIN: f32 = 15.;
const ROW_HEIGHT: f32 = 6.;
const NO_DATA: &str = "No data for the selected period.";

/// Text above the table.
#[derive(Debug, Clone)]
pub struct PdfHeader {
    pub title: String,
    pub period: String,
    pub filters: String,
    pub generated: NaiveDateTime,
}

impl PdfHeader {
    pub fn new(
        title: impl Into<String>,
        range: &DateRange,
        filter: &ReportFilter,
        generated: NaiveDateTime,
    ) -> Self {
        Self {
            title: title.into(),
            period: format!(
                "{} to {}",
                date_key(range.start.date()),
                date_key(range.end.date())
            ),
            filters: describe_filter(filter),
            generated,
        }
    }
}

/// Columns are `(title, width in mm)`. Every row has one cell per column.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfTable {
    pub columns: Vec<(&'static str, f32)>,
    pub rows: Vec<Vec<String>>,
    pub total: Vec<String>,
}

impl PdfTable {
    /// Column titles, rows and the total as plain cells.
    pub fn into_lines(self) -> Vec<Vec<String>> {
        let titles = self.columns.iter().map(|(title, _)| title.to_string());
        let mut lines = vec![titles.collect()];
        lines.extend(self.rows);
        lines.push(self.total);
        lines
    }
}

/// Empty when nothing narrows the report.
pub fn describe_filter(filter: &ReportFilter) -> String {
    let join = |ids: Vec<i64>| {
        ids.iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut parts = vec![];
    if !filter.projects.is_any() {
        parts.push(format!("projects {}", join(filter.projects.ids())));
    }
    if !filter.clients.is_any() {
        parts.push(format!("clients {}", join(filter.clients.ids())));
    }
    if !filter.tags.is_any() {
        parts.push(format!("tags {}", join(filter.tags.ids())));
    }
    if filter.billable_only {
        parts.push("billable only".to_string());
    }
    parts.join("; ")
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        format!("{}...", value.chars().take(max - 3).collect::<String>())
    } else {
        value.to_string()
    }
}

fn money(amount: f64) -> String {
    if amount > 0. {
        format!("${amount:.2}")
    } else {
        "-".to_string()
    }
}

pub fn summary_table(groups: &[SummaryGroup], group_label: &'static str) -> PdfTable {
    let rows = groups
        .iter()
        .map(|group| {
            vec![
                truncate(&group.label, 25),
                group.entries_count.to_string(),
                format_duration(group.total_seconds as f64),
                format!("{:.2}h", group.total_hours),
                money(group.billable_amount),
            ]
        })
        .collect();
    let seconds = groups.iter().map(|g| g.total_seconds).sum::<i64>();
    let hours = groups.iter().map(|g| g.total_hours).sum::<f64>();
    let amount = groups.iter().map(|g| g.billable_amount).sum::<f64>();
    PdfTable {
        columns: vec![
            (group_label, 60.),
            ("Entries", 25.),
            ("Duration", 40.),
            ("Hours", 30.),
            ("Billable", 35.),
        ],
        rows,
        total: vec![
            "TOTAL".to_string(),
            groups.iter().map(|g| g.entries_count).sum::<usize>().to_string(),
            format_duration(seconds as f64),
            format!("{:.2}h", round2(hours)),
            format!("${:.2}", round2(amount)),
        ],
    }
}

pub fn detailed_table(rows: &[DetailedRow]) -> PdfTable {
    let seconds = rows.iter().map(|r| r.duration_seconds).sum::<i64>();
    let mut total = vec![String::new(); 8];
    total[0] = format!("TOTAL: {} entries", rows.len());
    total[6] = format_duration(seconds as f64);
    PdfTable {
        columns: vec![
            ("Date", 25.),
            ("Description", 70.),
            ("Project", 40.),
            ("Client", 30.),
            ("Start", 25.),
            ("Stop", 25.),
            ("Duration", 30.),
            ("Bill", 20.),
        ],
        rows: rows
            .iter()
            .map(|row| {
                vec![
                    date_key(row.date()),
                    truncate(&row.description, 30),
                    truncate(row.project_name.as_deref().unwrap_or_default(), 18),
                    truncate(row.client_name.as_deref().unwrap_or_default(), 14),
                    row.start_time.format("%H:%M").to_string(),
                    row.stop_time.format("%H:%M").to_string(),
                    format_duration(row.duration_seconds as f64),
                    if row.billable { "Yes" } else { "No" }.to_string(),
                ]
            })
            .collect(),
        total,
    }
}

pub fn summary_to_pdf(
    groups: &[SummaryGroup],
    group_label: &'static str,
    header: &PdfHeader,
) -> Result<Vec<u8>> {
    render(header, &summary_table(groups, group_label), (210., 297.))
}

/// Landscape, the detailed table is wider than a portrait page.
pub fn detailed_to_pdf(rows: &[DetailedRow], header: &PdfHeader) -> Result<Vec<u8>> {
    render(header, &detailed_table(rows), (297., 210.))
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn render(header: &PdfHeader, table: &PdfTable, (width, height): (f32, f32)) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(&header.title, Mm(width), Mm(height), "Report");
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
    };
    let mut layer = doc.get_page(page).get_layer(layer);
    let mut y = height - MARGIN - 5.;

    layer.use_text(header.title.clone(), 16., Mm(MARGIN), Mm(y), &fonts.bold);
    y -= 8.;
    if !header.period.is_empty() {
        let text = format!("Period: {}", header.period);
        layer.use_text(text, 10., Mm(MARGIN), Mm(y), &fonts.regular);
        y -= ROW_HEIGHT;
    }
    if !header.filters.is_empty() {
        let text = format!("Filters: {}", header.filters);
        layer.use_text(text, 9., Mm(MARGIN), Mm(y), &fonts.regular);
        y -= ROW_HEIGHT;
    }
    let generated = format!("Generated: {}", header.generated.format("%Y-%m-%d %H:%M"));
    layer.use_text(generated, 8., Mm(MARGIN), Mm(y), &fonts.regular);
    y -= 2. * ROW_HEIGHT;

    if table.rows.is_empty() {
        layer.use_text(NO_DATA, 11., Mm(MARGIN), Mm(y), &fonts.regular);
        return Ok(doc.save_to_bytes()?);
    }

    let titles = table
        .columns
        .iter()
        .map(|(title, _)| title.to_string())
        .collect::<Vec<_>>();
    draw_row(&layer, &table.columns, &titles, y, &fonts.bold);
    y -= ROW_HEIGHT;
    for row in &table.rows {
        if y < MARGIN {
            let (page, next) = doc.add_page(Mm(width), Mm(height), "Report");
            layer = doc.get_page(page).get_layer(next);
            y = height - MARGIN - 5.;
            draw_row(&layer, &table.columns, &titles, y, &fonts.bold);
            y -= ROW_HEIGHT;
        }
        draw_row(&layer, &table.columns, row, y, &fonts.regular);
        y -= ROW_HEIGHT;
    }
    if y < MARGIN {
        let (page, next) = doc.add_page(Mm(width), Mm(height), "Report");
        layer = doc.get_page(page).get_layer(next);
        y = height - MARGIN - 5.;
    }
    draw_row(&layer, &table.columns, &table.total, y, &fonts.bold);

    Ok(doc.save_to_bytes()?)
}

fn draw_row(
    layer: &PdfLayerReference,
    columns: &[(&'static str, f32)],
    cells: &[String],
    y: f32,
    font: &IndirectFontRef,
) {
    let mut x = MARGIN;
    for ((_, width), cell) in columns.iter().zip(cells) {
        if !cell.is_empty() {
            layer.use_text(cell.clone(), 9., Mm(x), Mm(y), font);
        }
        x += width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        report::summary::GroupKey,
        utils::time::parse_timestamp,
    };

    fn header() -> PdfHeader {
        let range = DateRange::days(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 14).unwrap(),
        );
        PdfHeader::new(
            "Summary Report",
            &range,
            &ReportFilter::default().with_projects([2, 5]).billable_only(true),
            parse_timestamp("2024-01-15T08:00:00").unwrap(),
        )
    }

    fn group(label: &str, entries_count: usize, total_seconds: i64, amount: f64) -> SummaryGroup {
        SummaryGroup {
            key: GroupKey::Project(None),
            label: label.into(),
            color: None,
            entries_count,
            total_seconds,
            total_hours: round2(total_seconds as f64 / 3600.),
            billable_amount: amount,
        }
    }

    #[test]
    fn test_header_describes_range_and_filters() {
        let header = header();
        assert_eq!(header.period, "2024-01-08 to 2024-01-14");
        assert_eq!(header.filters, "projects 2, 5; billable only");
        assert_eq!(describe_filter(&ReportFilter::default()), "");
    }

    #[test]
    fn test_summary_table_total_row() {
        let table = summary_table(
            &[
                group("A project with a rather long name", 2, 3 * 3600, 150.),
                group("No Project", 1, 1200, 0.),
            ],
            "Project",
        );
        assert_eq!(table.columns[0].0, "Project");
        assert_eq!(table.rows[0][0], "A project with a rathe...");
        assert_eq!(table.rows[0][4], "$150.00");
        assert_eq!(table.rows[1][4], "-");
        assert_eq!(
            table.total,
            vec!["TOTAL", "3", "03:20:00", "3.33h", "$150.00"]
        );

        let lines = table.into_lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], vec!["Project", "Entries", "Duration", "Hours", "Billable"]);
        assert_eq!(lines[3][0], "TOTAL");
    }

    #[test]
    fn test_summary_pdf_document() -> Result<()> {
        let bytes = summary_to_pdf(&[group("Website", 2, 3 * 3600, 150.)], "Project", &header())?;
        assert!(bytes.starts_with(b"%PDF"));

        let empty = summary_to_pdf(&[], "Project", &header())?;
        assert!(empty.starts_with(b"%PDF"));
        Ok(())
    }

    #[test]
    fn test_detailed_pdf_document() -> Result<()> {
        let row = DetailedRow {
            entry_id: 1,
            description: "Header layout".into(),
            project_id: Some(2),
            project_name: Some("Website".into()),
            project_color: None,
            client_name: Some("Acme".into()),
            start_time: parse_timestamp("2024-01-08T09:00:00")?,
            stop_time: parse_timestamp("2024-01-08T10:30:00")?,
            duration_seconds: 5400,
            billable: true,
            billable_amount: 75.,
            tags: vec![],
        };
        let table = detailed_table(std::slice::from_ref(&row));
        assert_eq!(
            table.rows[0],
            vec!["2024-01-08", "Header layout", "Website", "Acme", "09:00", "10:30", "01:30:00", "Yes"]
        );
        assert_eq!(table.total[0], "TOTAL: 1 entries");
        assert_eq!(table.total[6], "01:30:00");

        // Enough rows to spill onto a second page.
        let rows = vec![row; 60];
        assert!(detailed_to_pdf(&rows, &header())?.starts_with(b"%PDF"));
        Ok(())
    }
}
