// 📗 Workbook Rendering - sheet tables → XLSX bytes
//
// Header row bold, data rows plain. Dates are real Excel dates formatted
// yyyy-mm-dd; ids, ages and ratings are numbers.

use chrono::Datelike;
use rust_xlsxwriter::{ColNum, ExcelDateTime, Format, RowNum, Workbook, Worksheet, XlsxError};

use super::tables::{CellValue, SheetTable};
use super::ExportError;

fn serialization(e: XlsxError) -> ExportError {
    ExportError::Serialization(e.to_string())
}

/// Render the tables, in order, as one workbook held in memory
pub fn render_workbook(tables: &[SheetTable]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();

    // Shared across sheets
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    for table in tables {
        write_sheet(&mut workbook, table, &header_format, &date_format)?;
    }

    workbook.save_to_buffer().map_err(serialization)
}

fn write_sheet(
    workbook: &mut Workbook,
    table: &SheetTable,
    header_format: &Format,
    date_format: &Format,
) -> Result<(), ExportError> {
    let worksheet = workbook
        .add_worksheet()
        .set_name(table.name())
        .map_err(serialization)?;

    write_headers(worksheet, table.headers(), header_format)?;

    for (idx, row) in table.rows.iter().enumerate() {
        let row_num = RowNum::try_from(idx + 1).map_err(|_| {
            ExportError::Serialization(format!("sheet '{}' has too many rows", table.name()))
        })?;

        for (col, cell) in row.iter().enumerate() {
            write_cell(worksheet, row_num, col as ColNum, cell, date_format)?;
        }
    }

    worksheet.set_freeze_panes(1, 0).map_err(serialization)?;

    for (col, header) in table.headers().iter().enumerate() {
        let width = (header.len() + 4).max(12) as f64;
        worksheet
            .set_column_width(col as ColNum, width)
            .map_err(serialization)?;
    }

    Ok(())
}

fn write_headers(
    worksheet: &mut Worksheet,
    headers: &[&str],
    header_format: &Format,
) -> Result<(), ExportError> {
    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as ColNum, *header, header_format)
            .map_err(serialization)?;
    }
    Ok(())
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: RowNum,
    col: ColNum,
    cell: &CellValue,
    date_format: &Format,
) -> Result<(), ExportError> {
    match cell {
        CellValue::Text(value) => {
            worksheet
                .write_string(row, col, value.as_str())
                .map_err(serialization)?;
        }
        CellValue::Integer(value) => {
            worksheet
                .write_number(row, col, *value as f64)
                .map_err(serialization)?;
        }
        CellValue::Number(value) => {
            worksheet.write_number(row, col, *value).map_err(serialization)?;
        }
        CellValue::Date(date) => {
            let year = u16::try_from(date.year()).map_err(|_| {
                ExportError::Serialization(format!("date {} is outside the spreadsheet range", date))
            })?;
            let excel_date =
                ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)
                    .map_err(serialization)?;
            worksheet
                .write_datetime_with_format(row, col, &excel_date, date_format)
                .map_err(serialization)?;
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tables::SheetKind;
    use calamine::{Data, Reader, Xlsx};
    use chrono::NaiveDate;
    use std::io::{Cursor, Read};

    fn open(bytes: Vec<u8>) -> Xlsx<Cursor<Vec<u8>>> {
        Xlsx::new(Cursor::new(bytes)).unwrap()
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
        xml
    }

    /// Body of the first `<name ...>...</name>` element
    fn element_body<'a>(xml: &'a str, name: &str) -> &'a str {
        let open = xml.find(&format!("<{}", name)).unwrap();
        let body = open + xml[open..].find('>').unwrap() + 1;
        let close = xml.find(&format!("</{}>", name)).unwrap();
        &xml[body..close]
    }

    fn attr_value(tag: &str, name: &str) -> Option<usize> {
        let key = format!(" {}=\"", name);
        let start = tag.find(&key)? + key.len();
        let len = tag[start..].find('"')?;
        Some(tag[start..start + len].parse().unwrap())
    }

    /// Whether the cell at `cell_ref` resolves to a bold font through styles.xml
    fn cell_is_bold(sheet_xml: &str, styles_xml: &str, cell_ref: &str) -> bool {
        let start = sheet_xml.find(&format!("<c r=\"{}\"", cell_ref)).unwrap();
        let end = start + sheet_xml[start..].find('>').unwrap();
        let style = attr_value(&sheet_xml[start..end], "s").unwrap_or(0);

        let xfs: Vec<&str> = element_body(styles_xml, "cellXfs").split("<xf ").skip(1).collect();
        let font_id = attr_value(&format!(" {}", xfs[style]), "fontId").unwrap_or(0);

        let fonts: Vec<&str> = element_body(styles_xml, "fonts").split("</font>").collect();
        fonts[font_id].contains("<b/>")
    }

    fn all_sheets() -> Vec<SheetTable> {
        SheetKind::ALL.iter().map(|k| SheetTable::new(*k)).collect()
    }

    #[test]
    fn test_renders_six_sheets_with_headers() {
        let bytes = render_workbook(&all_sheets()).unwrap();
        let mut workbook = open(bytes);

        assert_eq!(
            workbook.sheet_names(),
            vec![
                "Case",
                "Family Members",
                "Family Expenses",
                "Family Income",
                "Medical Expenses",
                "Notes"
            ]
        );

        let range = workbook.worksheet_range("Family Income").unwrap();
        assert_eq!(range.height(), 1);
        let header: Vec<String> = range.rows().next().unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(header, vec!["Case ID", "Source", "Amount"]);
    }

    #[test]
    fn test_cell_types_survive_rendering() {
        let mut income = SheetTable::new(SheetKind::FamilyIncome);
        income.rows.push(vec![
            CellValue::Integer(4),
            CellValue::text("Salary"),
            CellValue::Number(500.0),
        ]);
        let mut case = SheetTable::new(SheetKind::Case);
        case.rows.push(vec![
            CellValue::Integer(4),
            CellValue::text("Sara Ali"),
            CellValue::text("Female"),
            CellValue::text("Single"),
            CellValue::Date(NaiveDate::from_ymd_opt(1990, 1, 31).unwrap()),
            CellValue::text("123"),
            CellValue::text("Rent"),
            CellValue::text("North"),
        ]);

        let mut workbook = open(render_workbook(&[case, income]).unwrap());

        let income = workbook.worksheet_range("Family Income").unwrap();
        assert_eq!(income.height(), 2);
        assert_eq!(income.get((1, 0)), Some(&Data::Float(4.0)));
        assert_eq!(income.get((1, 1)), Some(&Data::String("Salary".to_string())));
        assert_eq!(income.get((1, 2)), Some(&Data::Float(500.0)));

        let case = workbook.worksheet_range("Case").unwrap();
        assert!(matches!(case.get((1, 4)), Some(Data::DateTime(_))));
        assert_eq!(case.get((1, 7)), Some(&Data::String("North".to_string())));
    }

    #[test]
    fn test_out_of_range_date_is_a_serialization_error() {
        let mut case = SheetTable::new(SheetKind::Case);
        case.rows.push(vec![
            CellValue::Integer(1),
            CellValue::Date(NaiveDate::from_ymd_opt(1850, 6, 1).unwrap()),
        ]);

        let err = render_workbook(&[case]).unwrap_err();
        assert!(matches!(err, ExportError::Serialization(_)));
    }

    #[test]
    fn test_header_row_is_bold_and_data_rows_are_not() {
        let mut income = SheetTable::new(SheetKind::FamilyIncome);
        income.rows.push(vec![
            CellValue::Integer(4),
            CellValue::text("Salary"),
            CellValue::Number(500.0),
        ]);
        let mut case = SheetTable::new(SheetKind::Case);
        case.rows.push(vec![
            CellValue::Integer(4),
            CellValue::text("Sara Ali"),
            CellValue::text("Female"),
            CellValue::text("Single"),
            CellValue::Date(NaiveDate::from_ymd_opt(1990, 1, 31).unwrap()),
        ]);

        let bytes = render_workbook(&[income, case]).unwrap();
        let styles = read_part(&bytes, "xl/styles.xml");

        let income_xml = read_part(&bytes, "xl/worksheets/sheet1.xml");
        for cell in ["A1", "B1", "C1"] {
            assert!(cell_is_bold(&income_xml, &styles, cell), "{} should be bold", cell);
        }
        for cell in ["A2", "B2", "C2"] {
            assert!(!cell_is_bold(&income_xml, &styles, cell), "{} should be plain", cell);
        }

        // Date cells carry a number format but not the header font
        let case_xml = read_part(&bytes, "xl/worksheets/sheet2.xml");
        assert!(cell_is_bold(&case_xml, &styles, "E1"));
        assert!(!cell_is_bold(&case_xml, &styles, "E2"));
        assert!(!cell_is_bold(&case_xml, &styles, "B2"));
    }
}
