use anyhow::{bail, Context, Result};
use csv::{ByteRecord, ReaderBuilder};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::{info, warn};

use crate::{
    config::PipelineConfig,
    process::{coerce, CellValue, SchemaMapping},
    sink::{InsertOutcome, RowInserter},
};

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// One normalized candidate row: canonical fields in order, plus the year
/// the file was published for.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub cells: Vec<CellValue>,
    pub year: i32,
}

/// Open the year file, consuming the leading byte-order marker when the
/// fixed per-year table says the file carries one.
pub(crate) fn open_reader(path: &Path, strip_bom: bool) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    if strip_bom {
        let head = reader.fill_buf()?;
        if head.starts_with(UTF8_BOM) {
            reader.consume(UTF8_BOM.len());
        }
    }
    Ok(reader)
}

/// Apply the precomputed mapping and type coercion to one raw record.
///
/// Fields are decoded lossily; a record too short to cover a mapped position
/// contributes a null rather than aborting the file.
pub(crate) fn map_record(record: &ByteRecord, mapping: &SchemaMapping, year: i32) -> ResultRow {
    let cells = mapping
        .indexes()
        .iter()
        .map(|&idx| match record.get(idx) {
            Some(raw) => coerce(&String::from_utf8_lossy(raw)),
            None => CellValue::Null,
        })
        .collect();
    ResultRow { cells, year }
}

/// Stream the year's decoded CSV into the sink, one row per insert.
///
/// The schema mapping is built once from the header row; every data row is
/// then coerced field-by-field and submitted. A row the sink cannot take is
/// logged and skipped so a single bad row never aborts the year.
pub async fn load_year(inserter: &RowInserter<'_>, cfg: &PipelineConfig, year: u16) -> Result<u64> {
    let path = cfg.csv_path(year);
    info!(year, file = %path.display(), "loading year file");

    let reader = open_reader(&path, cfg.strip_bom(year))?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .quote(b'"')
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = rdr.byte_records();
    let header: Vec<String> = match records.next() {
        Some(record) => record
            .context("reading header row")?
            .iter()
            .map(|field| String::from_utf8_lossy(field).into_owned())
            .collect(),
        None => bail!("{} contains no header row", path.display()),
    };
    let mapping = SchemaMapping::build(&header, &cfg.columns)?;

    let mut total = 0u64;
    let mut skipped = 0u64;
    for record in records {
        let record =
            record.with_context(|| format!("CSV parse error in {}", path.display()))?;
        total += 1;

        let row = map_record(&record, &mapping, i32::from(year));
        match inserter.insert(&row).await {
            InsertOutcome::Inserted
            | InsertOutcome::Duplicate
            | InsertOutcome::AbortedTransaction => {}
            InsertOutcome::Failed(err) => {
                warn!(year, row = total, "row insert failed, skipping: {err}");
                skipped += 1;
            }
        }
    }

    info!(year, rows = total, skipped, "finished loading year file");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn mapping_for(header: &[&str], canonical: &[&str]) -> SchemaMapping {
        let header: Vec<String> = header.iter().map(|s| s.to_string()).collect();
        let canonical: Vec<String> = canonical.iter().map(|s| s.to_string()).collect();
        SchemaMapping::build(&header, &canonical).unwrap()
    }

    #[test]
    fn maps_a_delimited_row_to_typed_fields() {
        let mapping = mapping_for(
            &["OutID", "Region", "Status", "Score"],
            &["OutID", "Region", "Status", "Score"],
        );
        let record = ByteRecord::from(vec!["A1", "West", "Зараховано", "85,5"]);

        let row = map_record(&record, &mapping, 2019);
        assert_eq!(
            row.cells,
            vec![
                CellValue::Text("A1".to_string()),
                CellValue::Text("West".to_string()),
                CellValue::Text("Зараховано".to_string()),
                CellValue::Numeric(85.5),
            ]
        );
        assert_eq!(row.year, 2019);
    }

    #[test]
    fn short_record_yields_null_for_missing_fields() {
        let mapping = mapping_for(&["OutID", "Score"], &["OutID", "Score"]);
        let record = ByteRecord::from(vec!["A1"]);

        let row = map_record(&record, &mapping, 2020);
        assert_eq!(
            row.cells,
            vec![CellValue::Text("A1".to_string()), CellValue::Null]
        );
    }

    #[test]
    fn bom_is_stripped_only_when_asked() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"\xef\xbb\xbfOutID;Score\n")?;

        let mut with_strip = String::new();
        open_reader(file.path(), true)?.read_line(&mut with_strip)?;
        assert_eq!(with_strip, "OutID;Score\n");

        let mut without_strip = String::new();
        open_reader(file.path(), false)?.read_line(&mut without_strip)?;
        assert_eq!(without_strip, "\u{feff}OutID;Score\n");
        Ok(())
    }

    #[test]
    fn bom_strip_leaves_unmarked_files_alone() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"OutID;Score\n")?;

        let mut line = String::new();
        open_reader(file.path(), true)?.read_line(&mut line)?;
        assert_eq!(line, "OutID;Score\n");
        Ok(())
    }

    #[test]
    fn reordered_year_file_parses_into_canonical_rows() -> Result<()> {
        // 2018-style file: extra columns, different order, BOM
        let mut file = NamedTempFile::new()?;
        file.write_all("\u{feff}Birth;ENGBALL100;OUTID;REGNAME;ENGTESTSTATUS\n".as_bytes())?;
        file.write_all("1999;null;A1;Львівська область;Зараховано\n".as_bytes())?;
        file.write_all("2000;\"142,5\";B2;Київська область;Зараховано\n".as_bytes())?;

        let reader = open_reader(file.path(), true)?;
        let mut rdr = ReaderBuilder::new()
            .delimiter(b';')
            .quote(b'"')
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = rdr.byte_records();
        let header: Vec<String> = records
            .next()
            .unwrap()?
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();
        let canonical: Vec<String> = ["OutID", "Regname", "engTestStatus", "engBall100"]
            .map(String::from)
            .to_vec();
        let mapping = SchemaMapping::build(&header, &canonical).unwrap();

        let rows: Vec<ResultRow> = records
            .map(|r| map_record(&r.unwrap(), &mapping, 2018))
            .collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].cells,
            vec![
                CellValue::Text("A1".to_string()),
                CellValue::Text("Львівська область".to_string()),
                CellValue::Text("Зараховано".to_string()),
                CellValue::Null,
            ]
        );
        assert_eq!(rows[1].cells[3], CellValue::Numeric(142.5));
        Ok(())
    }
}
