use scraper::ElementRef;

use super::markup::{plain_text, render_children};
use super::signatures::{Layout, has_class};
use super::{ExcerptBudget, child_elements, descendant_elements};
use crate::output::{FIELD_COUNT_LIMIT, FIELD_NAME_LIMIT, FIELD_VALUE_LIMIT, Field};
use crate::text::{char_len, limit_length};

/// Combined length of all infobox fields on one card.
const FIELD_TOTAL_LIMIT: usize = 4_000;

#[derive(Debug, Default)]
pub struct Infobox {
    pub title: Option<String>,
    pub fields: Vec<Field>,
}

/// Collects fields until the count or cumulative length budget runs out.
struct FieldSink {
    fields: Vec<Field>,
    max_count: usize,
    value_limit: usize,
    total: usize,
    full: bool,
}

impl FieldSink {
    fn new(budget: &ExcerptBudget) -> Self {
        let max_count = budget.field_count.min(FIELD_COUNT_LIMIT);
        Self {
            fields: Vec::new(),
            max_count,
            value_limit: budget.field_length.min(FIELD_VALUE_LIMIT),
            total: 0,
            full: max_count == 0 || budget.field_length == 0,
        }
    }

    fn push(&mut self, field: Field) {
        if self.full {
            return;
        }
        let size = char_len(&field.name) + char_len(&field.value);
        if self.total + size > FIELD_TOTAL_LIMIT {
            self.full = true;
            return;
        }
        self.total += size;
        self.fields.push(field);
        if self.fields.len() >= self.max_count {
            self.full = true;
        }
    }

    /// The bold markers count against the value limit.
    fn header(&mut self, text: &str) {
        let text = limit_length(text, self.value_limit.saturating_sub(4));
        if !text.is_empty() {
            self.push(Field::header(&text));
        }
    }

    fn pair(&mut self, label: &str, value: &str) {
        let label = label.trim().trim_end_matches(':').trim();
        let name = limit_length(label, FIELD_NAME_LIMIT);
        let value = limit_length(value.trim(), self.value_limit);
        if !name.is_empty() && !value.is_empty() {
            self.push(Field::new(name, value, true));
        }
    }
}

pub fn parse(element: ElementRef<'_>, layout: Layout, budget: &ExcerptBudget, server: &str) -> Infobox {
    let mut sink = FieldSink::new(budget);
    let title = match layout {
        Layout::Portable => portable(element, &mut sink, server),
        Layout::Table => table(element, &mut sink, server, true),
        Layout::Div => div(element, &mut sink, server),
    };
    Infobox {
        title: title.filter(|title| !title.is_empty()),
        fields: sink.fields,
    }
}

fn portable(element: ElementRef<'_>, sink: &mut FieldSink, server: &str) -> Option<String> {
    let title = descendant_elements(element)
        .find(|child| has_class(*child, "pi-title"))
        .map(plain_text);
    for item in descendant_elements(element) {
        if sink.full {
            break;
        }
        if has_class(item, "pi-header") {
            sink.header(&plain_text(item));
        } else if has_class(item, "pi-data") {
            let label = descendant_elements(item).find(|child| has_class(*child, "pi-data-label"));
            let value = descendant_elements(item).find(|child| has_class(*child, "pi-data-value"));
            if let (Some(label), Some(value)) = (label, value) {
                sink.pair(&plain_text(label), &render_children(value, server));
            }
        } else if has_class(item, "pi-horizontal-group") {
            let labels: Vec<ElementRef<'_>> = descendant_elements(item)
                .filter(|child| has_class(*child, "pi-data-label"))
                .collect();
            let values: Vec<ElementRef<'_>> = descendant_elements(item)
                .filter(|child| has_class(*child, "pi-data-value"))
                .collect();
            for (label, value) in labels.into_iter().zip(values) {
                sink.pair(&plain_text(label), &render_children(value, server));
            }
        }
    }
    title
}

fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    child_elements(row)
        .filter(|cell| matches!(cell.value().name(), "th" | "td"))
        .collect()
}

fn is_header_cell(cell: ElementRef<'_>) -> bool {
    cell.value().name() == "th"
}

/// Rows whose closest enclosing table is `table`, or every descendant row
/// when `own_rows_only` is false.
fn rows(table: ElementRef<'_>, own_rows_only: bool) -> Vec<ElementRef<'_>> {
    descendant_elements(table)
        .filter(|row| row.value().name() == "tr")
        .filter(|row| {
            !own_rows_only
                || row
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|ancestor| ancestor.value().name() == "table")
                    .is_some_and(|ancestor| ancestor.id() == table.id())
        })
        .collect()
}

/// Label cells are normally `th`. When the first multi-cell row carries no
/// header cell the table is read in shifted mode: first cell label, second
/// cell value, for every remaining row.
fn table(element: ElementRef<'_>, sink: &mut FieldSink, server: &str, own_rows_only: bool) -> Option<String> {
    let title = child_elements(element)
        .find(|child| child.value().name() == "caption")
        .map(plain_text);
    let mut shifted = false;
    let mut seen_pair_row = false;

    for row in rows(element, own_rows_only) {
        if sink.full {
            break;
        }
        let cells = cells(row);
        match cells.as_slice() {
            [] => {}
            [single] => {
                if is_header_cell(*single) {
                    sink.header(&plain_text(*single));
                }
            }
            [first, second, ..] => {
                if !seen_pair_row {
                    seen_pair_row = true;
                    shifted = !cells.iter().any(|cell| is_header_cell(*cell));
                }
                if shifted {
                    sink.pair(&plain_text(*first), &render_children(*second, server));
                    continue;
                }
                let Some(label_index) = cells.iter().position(|cell| is_header_cell(*cell)) else {
                    continue;
                };
                if let Some(value) = cells[label_index + 1..]
                    .iter()
                    .find(|cell| !is_header_cell(**cell))
                {
                    sink.pair(&plain_text(cells[label_index]), &render_children(*value, server));
                }
            }
        }
    }
    title
}

fn div(element: ElementRef<'_>, sink: &mut FieldSink, server: &str) -> Option<String> {
    if descendant_elements(element).any(|child| child.value().name() == "tr") {
        return table(element, sink, server, false);
    }
    let title = descendant_elements(element)
        .find(|child| class_contains(*child, "title"))
        .map(plain_text);
    for item in descendant_elements(element) {
        if sink.full {
            break;
        }
        if class_contains(item, "header") {
            sink.header(&plain_text(item));
        } else if class_contains(item, "label") {
            let value = item
                .next_siblings()
                .find_map(ElementRef::wrap);
            if let Some(value) = value {
                sink.pair(&plain_text(item), &render_children(value, server));
            }
        }
    }
    title
}

fn class_contains(element: ElementRef<'_>, needle: &str) -> bool {
    element
        .value()
        .classes()
        .any(|class| class.to_ascii_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excerpt::signatures::infobox_layout;
    use scraper::Html;

    const SERVER: &str = "https://wiki.example.org";

    fn parse_first(html: &str, budget: &ExcerptBudget) -> Infobox {
        let document = Html::parse_fragment(html);
        let element = descendant_elements(document.root_element())
            .find(|element| infobox_layout(*element).is_some())
            .expect("infobox");
        let layout = infobox_layout(element).expect("layout");
        parse(element, layout, budget, SERVER)
    }

    fn pairs(infobox: &Infobox) -> Vec<(String, String)> {
        infobox
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.value.clone()))
            .collect()
    }

    #[test]
    fn table_rows_pair_header_cells_with_values() {
        let infobox = parse_first(
            r#"<table class="infobox"><caption>Ada</caption>
                <tr><th colspan="2">Personal</th></tr>
                <tr><th>Born:</th><td>10 December <b>1815</b></td></tr>
                <tr><td colspan="2"><img src="a.png"></td></tr>
                <tr><th>Known for</th><td><a href="/wiki/Engine">Engine</a></td></tr>
            </table>"#,
            &ExcerptBudget::default(),
        );
        assert_eq!(infobox.title.as_deref(), Some("Ada"));
        assert_eq!(
            pairs(&infobox),
            vec![
                ("\u{200b}".to_string(), "**Personal**".to_string()),
                ("Born".to_string(), "10 December **1815**".to_string()),
                (
                    "Known for".to_string(),
                    "[Engine](https://wiki.example.org/wiki/Engine)".to_string()
                ),
            ]
        );
        assert!(!infobox.fields[0].inline);
        assert!(infobox.fields[1].inline);
    }

    #[test]
    fn header_rows_respect_the_field_length_budget() {
        let budget = ExcerptBudget {
            field_length: 12,
            ..ExcerptBudget::default()
        };
        let infobox = parse_first(
            r#"<table class="infobox">
                <tr><th colspan="2">An exceptionally long header row</th></tr>
                <tr><th>Level</th><td>3</td></tr>
            </table>"#,
            &budget,
        );
        let header = &infobox.fields[0];
        assert_eq!(header.name, "\u{200b}");
        assert!(header.value.starts_with("**") && header.value.ends_with("**"));
        assert!(char_len(&header.value) <= 12, "{}", header.value);
    }

    #[test]
    fn first_row_with_data_label_switches_to_shifted_mode() {
        let infobox = parse_first(
            r#"<table class="infobox">
                <tr><td>Type</td><td>Sword</td></tr>
                <tr><th>Damage</th><td>10</td></tr>
                <tr><th>Weight</th><td>2 kg</td></tr>
            </table>"#,
            &ExcerptBudget::default(),
        );
        assert_eq!(
            pairs(&infobox),
            vec![
                ("Type".to_string(), "Sword".to_string()),
                ("Damage".to_string(), "10".to_string()),
                ("Weight".to_string(), "2 kg".to_string()),
            ]
        );
    }

    #[test]
    fn nested_tables_do_not_leak_rows() {
        let infobox = parse_first(
            r#"<table class="infobox">
                <tr><th>Stats</th><td><table><tr><th>Inner</th><td>x</td></tr></table></td></tr>
                <tr><th>Level</th><td>3</td></tr>
            </table>"#,
            &ExcerptBudget::default(),
        );
        let names: Vec<String> = pairs(&infobox).into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Level".to_string()]);
    }

    #[test]
    fn portable_infobox_reads_data_headers_and_groups() {
        let infobox = parse_first(
            r#"<aside class="portable-infobox">
                <h2 class="pi-title">Creeper</h2>
                <h2 class="pi-header">Stats</h2>
                <div class="pi-data"><h3 class="pi-data-label">Health</h3><div class="pi-data-value">20</div></div>
                <section class="pi-group"><table class="pi-horizontal-group">
                    <thead><tr><th class="pi-data-label">Easy</th><th class="pi-data-label">Hard</th></tr></thead>
                    <tbody><tr><td class="pi-data-value">22</td><td class="pi-data-value">49</td></tr></tbody>
                </table></section>
            </aside>"#,
            &ExcerptBudget::default(),
        );
        assert_eq!(infobox.title.as_deref(), Some("Creeper"));
        assert_eq!(
            pairs(&infobox),
            vec![
                ("\u{200b}".to_string(), "**Stats**".to_string()),
                ("Health".to_string(), "20".to_string()),
                ("Easy".to_string(), "22".to_string()),
                ("Hard".to_string(), "49".to_string()),
            ]
        );
    }

    #[test]
    fn div_infobox_pairs_labels_with_following_values() {
        let infobox = parse_first(
            r#"<div class="druid-infobox"><div class="druid-title">Hero</div>
                <div class="druid-row"><div class="druid-label">Role</div><div class="druid-data">Tank</div></div>
            </div>"#,
            &ExcerptBudget::default(),
        );
        assert_eq!(infobox.title.as_deref(), Some("Hero"));
        assert_eq!(pairs(&infobox), vec![("Role".to_string(), "Tank".to_string())]);
    }

    #[test]
    fn field_budget_limits_count_and_length() {
        let rows: String = (0..10)
            .map(|index| format!("<tr><th>Row {index}</th><td>{}</td></tr>", "value ".repeat(30)))
            .collect();
        let html = format!(r#"<table class="infobox">{rows}</table>"#);
        let budget = ExcerptBudget {
            field_count: 3,
            field_length: 40,
            ..ExcerptBudget::default()
        };
        let infobox = parse_first(&html, &budget);
        assert_eq!(infobox.fields.len(), 3);
        assert!(infobox.fields.iter().all(|field| char_len(&field.value) <= 40));

        let infobox = parse_first(&html, &ExcerptBudget::disabled());
        assert!(infobox.fields.is_empty());
    }
}
