use crate::domain::{format_brl, format_brl_currency, format_date_br, truncate, Cents};

use super::{Settlement, TITLE};

/// Printed for absent or zero amounts.
pub const PLACEHOLDER: &str = "-";
/// Printed under the last row of a page that continues on the next one.
pub const CONTINUED: &str = "Continua na próxima página...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// A ledger table column: title, character budget and printed width in points.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub title: &'static str,
    pub max_chars: usize,
    pub width: f32,
    pub align: Align,
}

pub const COLUMNS: [Column; 7] = [
    Column { title: "Data", max_chars: 10, width: 62.0, align: Align::Left },
    Column { title: "Documento", max_chars: 14, width: 80.0, align: Align::Left },
    Column { title: "Fornecedor", max_chars: 26, width: 140.0, align: Align::Left },
    Column { title: "Tipo de custo", max_chars: 18, width: 100.0, align: Align::Left },
    Column { title: "Histórico", max_chars: 42, width: 212.0, align: Align::Left },
    Column { title: "Entrada", max_chars: 16, width: 88.0, align: Align::Right },
    Column { title: "Saída", max_chars: 16, width: 88.0, align: Align::Right },
];

/// Fixed page geometry, in PDF points. Defaults to A4 landscape.
///
/// Every page reserves the same header region (title and metadata on the
/// first page, a continuation banner on the others) and the same footer
/// region (totals, balances and signatures), so the row capacity is the
/// same on every page.
#[derive(Debug, Clone, Copy)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub header_height: f32,
    pub column_header_height: f32,
    pub row_height: f32,
    pub marker_height: f32,
    pub footer_height: f32,
    pub font_size: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: 842.0,
            height: 595.0,
            margin: 36.0,
            header_height: 120.0,
            column_header_height: 18.0,
            row_height: 12.0,
            marker_height: 14.0,
            footer_height: 120.0,
            font_size: 8.0,
        }
    }
}

impl PageGeometry {
    /// How many ledger rows fit between the reserved regions.
    pub fn max_rows(&self) -> usize {
        let available = self.height
            - 2.0 * self.margin
            - self.header_height
            - self.column_header_height
            - self.marker_height
            - self.footer_height;
        if available <= 0.0 || self.row_height <= 0.0 {
            return 1;
        }
        ((available / self.row_height).floor() as usize).max(1)
    }

    /// Row capacity per page: the requested value clamped to what fits.
    pub fn rows_per_page(&self, requested: Option<usize>) -> usize {
        let max = self.max_rows();
        requested.map_or(max, |rows| rows.clamp(1, max))
    }

    pub fn table_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }
}

/// A table row with every cell already formatted and truncated.
pub type Cells = [String; 7];

/// Closing block printed once, on the last page.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryBlock {
    pub totals: Cells,
    pub lines: Vec<(String, String)>,
    pub signatures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPage {
    /// 1-based
    pub number: usize,
    pub total_pages: usize,
    /// Column titles, repeated on every page
    pub column_headers: Vec<String>,
    pub rows: Vec<Cells>,
    /// Set when the table goes on in the next page
    pub continued: bool,
    pub summary: Option<SummaryBlock>,
}

impl LayoutPage {
    pub fn is_first(&self) -> bool {
        self.number == 1
    }
}

/// Settlement split into pages, with the page-independent text resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementLayout {
    pub title: String,
    pub subtitle: String,
    /// Trip information, printed on the left of the first page
    pub trip_info: Vec<(String, String)>,
    /// Employee and vehicle information, printed on the right of the first page
    pub employee_info: Vec<(String, String)>,
    pub pages: Vec<LayoutPage>,
}

/// Split the settlement's ledger into pages of `rows_per_page` rows.
///
/// Always yields at least one page. The output depends only on the input.
pub fn paginate(settlement: &Settlement, rows_per_page: usize) -> SettlementLayout {
    let rows_per_page = rows_per_page.max(1);
    let rows: Vec<Cells> = settlement
        .rows
        .iter()
        .map(|row| {
            [
                format_date_br(row.date),
                truncate(&row.document_number, COLUMNS[1].max_chars),
                truncate(&row.counterparty, COLUMNS[2].max_chars),
                truncate(&row.cost_type, COLUMNS[3].max_chars),
                truncate(&row.description, COLUMNS[4].max_chars),
                credit_cell(row.credit),
                debit_cell(row.debit),
            ]
        })
        .collect();

    let chunks: Vec<Vec<Cells>> = if rows.is_empty() {
        vec![Vec::new()]
    } else {
        rows.chunks(rows_per_page).map(<[Cells]>::to_vec).collect()
    };
    let total_pages = chunks.len();
    let column_headers: Vec<String> = COLUMNS.iter().map(|c| c.title.to_string()).collect();

    let pages = chunks
        .into_iter()
        .enumerate()
        .map(|(index, rows)| {
            let last = index + 1 == total_pages;
            LayoutPage {
                number: index + 1,
                total_pages,
                column_headers: column_headers.clone(),
                rows,
                continued: !last,
                summary: last.then(|| summary_block(settlement)),
            }
        })
        .collect();

    SettlementLayout {
        title: TITLE.to_string(),
        subtitle: settlement.issuer.clone().unwrap_or_default(),
        trip_info: trip_info(settlement),
        employee_info: employee_info(settlement),
        pages,
    }
}

/// Formatted credit, or the placeholder when absent or zero.
pub fn credit_cell(amount: Option<Cents>) -> String {
    match amount {
        Some(cents) if cents != 0 => format_brl(cents),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Formatted debit with a leading minus, or the placeholder when absent or zero.
pub fn debit_cell(amount: Option<Cents>) -> String {
    match amount {
        Some(cents) if cents != 0 => format!("-{}", format_brl(cents.abs())),
        _ => PLACEHOLDER.to_string(),
    }
}

fn trip_info(settlement: &Settlement) -> Vec<(String, String)> {
    vec![
        ("Caixa nº".to_string(), format!("{:03}", settlement.box_number)),
        ("Data da viagem".to_string(), format_date_br(settlement.trip_date)),
        ("Destino".to_string(), truncate(&settlement.destination, 48)),
        ("Empresa".to_string(), truncate(&settlement.company, 48)),
    ]
}

fn employee_info(settlement: &Settlement) -> Vec<(String, String)> {
    let mut info = vec![
        ("Colaborador".to_string(), truncate(&settlement.employee, 48)),
        ("Documento".to_string(), truncate(&settlement.employee_document, 48)),
        ("Veículo".to_string(), truncate(&settlement.vehicle, 48)),
    ];
    if let Some(note) = &settlement.note {
        info.push(("Observação".to_string(), truncate(note, 48)));
    }
    info
}

fn summary_block(settlement: &Settlement) -> SummaryBlock {
    let totals = settlement.totals;
    SummaryBlock {
        totals: [
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            "Totais".to_string(),
            credit_cell(Some(totals.credits)),
            debit_cell(Some(totals.debits)),
        ],
        lines: vec![
            ("Saldo anterior".to_string(), format_brl_currency(totals.opening)),
            (
                format!("Total de adiantamentos ({})", settlement.advance_count),
                format_brl_currency(totals.advances),
            ),
            ("Saldo final".to_string(), format_brl_currency(totals.closing)),
        ],
        signatures: vec![
            truncate(&settlement.employee, 40),
            "Aprovação".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::report::{SettlementRow, SettlementTotals};

    fn settlement_with_rows(count: usize) -> Settlement {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let rows = (0..count)
            .map(|i| SettlementRow {
                date,
                document_number: format!("NF-{}", i),
                counterparty: "Auto Posto Rodovia dos Bandeirantes Ltda".to_string(),
                cost_type: "Combustível".to_string(),
                description: format!("Abastecimento {}", i),
                credit: None,
                debit: Some(10000),
            })
            .collect();

        Settlement {
            issuer: None,
            box_number: 7,
            trip_date: date,
            destination: "Ribeirão Preto".to_string(),
            company: "Transportes Exemplo".to_string(),
            employee: "Maria Souza".to_string(),
            employee_document: "123.456.789-00".to_string(),
            vehicle: "ABC1D23".to_string(),
            note: None,
            rows,
            advance_count: 0,
            totals: SettlementTotals {
                opening: 0,
                credits: 0,
                debits: 10000 * count as Cents,
                advances: 0,
                closing: -(10000 * count as Cents),
            },
        }
    }

    #[test]
    fn test_forty_rows_at_twenty_per_page_make_two_pages() {
        let layout = paginate(&settlement_with_rows(40), 20);

        assert_eq!(layout.pages.len(), 2);
        assert_eq!(layout.pages[0].rows.len(), 20);
        assert_eq!(layout.pages[1].rows.len(), 20);
        assert!(layout.pages[0].continued);
        assert!(!layout.pages[1].continued);
        assert!(layout.pages[0].summary.is_none());
        assert!(layout.pages[1].summary.is_some());

        // headers repeat on the continuation page
        assert_eq!(layout.pages[1].column_headers, layout.pages[0].column_headers);
        assert_eq!(layout.pages[1].column_headers[0], "Data");
        assert_eq!(layout.pages[1].total_pages, 2);
    }

    #[test]
    fn test_partial_last_page() {
        let layout = paginate(&settlement_with_rows(41), 20);
        assert_eq!(layout.pages.len(), 3);
        assert_eq!(layout.pages[2].rows.len(), 1);
        assert_eq!(layout.pages[2].rows[0][1], "NF-40");
    }

    #[test]
    fn test_empty_ledger_still_has_one_page() {
        let layout = paginate(&settlement_with_rows(0), 20);
        assert_eq!(layout.pages.len(), 1);
        assert!(layout.pages[0].rows.is_empty());
        assert!(!layout.pages[0].continued);
        assert!(layout.pages[0].summary.is_some());
    }

    #[test]
    fn test_pagination_is_deterministic() {
        let settlement = settlement_with_rows(33);
        assert_eq!(paginate(&settlement, 10), paginate(&settlement, 10));
    }

    #[test]
    fn test_cells_are_truncated_and_formatted() {
        let layout = paginate(&settlement_with_rows(1), 20);
        let row = &layout.pages[0].rows[0];

        assert_eq!(row[0], "01/06/2024");
        assert!(row[2].chars().count() <= COLUMNS[2].max_chars);
        assert!(row[2].ends_with("..."));
        assert_eq!(row[5], PLACEHOLDER);
        assert_eq!(row[6], "-100,00");
    }

    #[test]
    fn test_summary_lines() {
        let layout = paginate(&settlement_with_rows(2), 20);
        let summary = layout.pages[0].summary.as_ref().unwrap();

        assert_eq!(summary.totals[5], PLACEHOLDER);
        assert_eq!(summary.totals[6], "-200,00");
        assert_eq!(summary.lines[0], ("Saldo anterior".to_string(), "R$ 0,00".to_string()));
        assert_eq!(summary.lines[2].1, "-R$ 200,00");
    }

    #[test]
    fn test_amount_cells() {
        assert_eq!(credit_cell(Some(123456)), "1.234,56");
        assert_eq!(credit_cell(Some(0)), PLACEHOLDER);
        assert_eq!(credit_cell(None), PLACEHOLDER);
        assert_eq!(debit_cell(Some(5000)), "-50,00");
        assert_eq!(debit_cell(None), PLACEHOLDER);
    }

    #[test]
    fn test_geometry_capacity() {
        let geometry = PageGeometry::default();
        assert_eq!(geometry.max_rows(), 20);
        assert_eq!(geometry.rows_per_page(None), 20);
        assert_eq!(geometry.rows_per_page(Some(5)), 5);
        assert_eq!(geometry.rows_per_page(Some(500)), 20);
        assert_eq!(geometry.rows_per_page(Some(0)), 1);
    }
}
