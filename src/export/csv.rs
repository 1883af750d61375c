//! CSV text for each report shape. Lines are joined with `\n` and there is no trailing newline.

use crate::{
    report::{
        billing::round2,
        detailed::DetailedRow,
        summary::SummaryGroup,
        weekly::{WeeklyRow, WEEKDAYS},
    },
    utils::time::to_timestamp,
};

const TOTAL: &str = "TOTAL";

/// Quotes a field holding a comma, a quote or a line break, doubling inner quotes.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn number(value: f64) -> String {
    // Avoids "-0" for rounded away negatives.
    if value == 0. {
        "0".to_string()
    } else {
        value.to_string()
    }
}

fn line<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// `group_label` titles the first column, e.g. "Project".
pub fn summary_to_csv(groups: &[SummaryGroup], group_label: &str) -> String {
    let mut lines = vec![line([
        group_label,
        "Entries",
        "Duration (h)",
        "Billable Amount",
    ])];
    for group in groups {
        lines.push(line([
            group.label.clone(),
            group.entries_count.to_string(),
            number(group.total_hours),
            number(group.billable_amount),
        ]));
    }
    let entries = groups.iter().map(|g| g.entries_count).sum::<usize>();
    let hours = groups.iter().map(|g| g.total_hours).sum::<f64>();
    let amount = groups.iter().map(|g| g.billable_amount).sum::<f64>();
    lines.push(line([
        TOTAL.to_string(),
        entries.to_string(),
        number(round2(hours)),
        number(round2(amount)),
    ]));
    lines.join("\n")
}

/// Header, one line per project and the TOTAL line, as unescaped cells.
pub fn weekly_table(rows: &[WeeklyRow]) -> Vec<Vec<String>> {
    let header = std::iter::once("Project")
        .chain(WEEKDAYS)
        .chain(std::iter::once("Total"))
        .map(str::to_string)
        .collect();
    let mut lines = vec![header];

    let mut day_totals = [0.; 7];
    let mut grand_total = 0.;
    for row in rows {
        for (total, hours) in day_totals.iter_mut().zip(row.days) {
            *total += hours;
        }
        grand_total += row.total;
        lines.push(
            std::iter::once(row.project_name.clone())
                .chain(row.days.iter().map(|d| number(*d)))
                .chain(std::iter::once(number(row.total)))
                .collect(),
        );
    }
    lines.push(
        std::iter::once(TOTAL.to_string())
            .chain(day_totals.iter().map(|d| number(round2(*d))))
            .chain(std::iter::once(number(round2(grand_total))))
            .collect(),
    );
    lines
}

pub fn weekly_to_csv(rows: &[WeeklyRow]) -> String {
    weekly_table(rows)
        .into_iter()
        .map(line)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn detailed_to_csv(rows: &[DetailedRow]) -> String {
    let mut lines = vec![line([
        "Description",
        "Project",
        "Client",
        "Start",
        "Stop",
        "Duration (s)",
        "Billable",
        "Amount",
        "Tags",
    ])];
    for row in rows {
        let tags = row
            .tags
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        lines.push(line([
            row.description.clone(),
            row.project_name.clone().unwrap_or_default(),
            row.client_name.clone().unwrap_or_default(),
            to_timestamp(row.start_time),
            to_timestamp(row.stop_time),
            row.duration_seconds.to_string(),
            if row.billable { "Yes" } else { "No" }.to_string(),
            number(row.billable_amount),
            tags,
        ]));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        report::{detailed::TagRef, summary::GroupKey},
        utils::time::parse_timestamp,
    };

    fn group(label: &str, entries_count: usize, total_hours: f64, amount: f64) -> SummaryGroup {
        SummaryGroup {
            key: GroupKey::Project(None),
            label: label.into(),
            color: None,
            entries_count,
            total_seconds: (total_hours * 3600.) as i64,
            total_hours,
            billable_amount: amount,
        }
    }

    fn detailed(description: &str) -> DetailedRow {
        DetailedRow {
            entry_id: 1,
            description: description.into(),
            project_id: Some(2),
            project_name: Some("Website".into()),
            project_color: Some("#4A90D9".into()),
            client_name: None,
            start_time: parse_timestamp("2024-01-08T09:00:00").unwrap(),
            stop_time: parse_timestamp("2024-01-08T10:30:00").unwrap(),
            duration_seconds: 5400,
            billable: true,
            billable_amount: 75.,
            tags: vec![
                TagRef { id: 1, name: "design".into() },
                TagRef { id: 2, name: "review".into() },
            ],
        }
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_field(""), "");
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(
            summary_to_csv(&[], "Project"),
            "Project,Entries,Duration (h),Billable Amount\nTOTAL,0,0,0"
        );
    }

    #[test]
    fn test_summary_total_row() {
        let csv = summary_to_csv(
            &[group("Acme, Inc.", 2, 3., 150.), group("No Client", 1, 0.33, 33.33)],
            "Client",
        );
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Client,Entries,Duration (h),Billable Amount");
        assert_eq!(lines[1], "\"Acme, Inc.\",2,3,150");
        assert_eq!(lines[2], "No Client,1,0.33,33.33");
        assert_eq!(lines[3], "TOTAL,3,3.33,183.33");
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn test_weekly_totals() {
        let rows = vec![
            WeeklyRow {
                project_id: Some(1),
                project_name: "Website".into(),
                project_color: None,
                days: [2., 0., 1., 0., 0., 0., 0.],
                total: 3.,
            },
            WeeklyRow {
                project_id: None,
                project_name: "No Project".into(),
                project_color: None,
                days: [0.5, 0., 0., 0., 0., 0., 0.25],
                total: 0.75,
            },
        ];
        assert_eq!(
            weekly_to_csv(&rows),
            "Project,Mon,Tue,Wed,Thu,Fri,Sat,Sun,Total\n\
             Website,2,0,1,0,0,0,0,3\n\
             No Project,0.5,0,0,0,0,0,0.25,0.75\n\
             TOTAL,2.5,0,1,0,0,0,0.25,3.75"
        );

        let table = weekly_table(&rows);
        assert_eq!(table.len(), 4);
        assert_eq!(table[3][0], "TOTAL");
        assert_eq!(table[3][8], "3.75");
    }

    #[test]
    fn test_detailed_rows() {
        let csv = detailed_to_csv(&[detailed("Fix header, footer"), detailed("The \"big\" one")]);
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Description,Project,Client,Start,Stop,Duration (s),Billable,Amount,Tags"
        );
        assert_eq!(
            lines[1],
            "\"Fix header, footer\",Website,,2024-01-08T09:00:00,2024-01-08T10:30:00,5400,Yes,75,design; review"
        );
        assert!(lines[2].starts_with("\"The \"\"big\"\" one\",Website,"));
    }
}
