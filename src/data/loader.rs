use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, Float32Array, Float64Array, Int32Array, Int64Array, LargeListArray, ListArray,
};
use arrow::datatypes::DataType;
use fitsio::FitsFile;
use fitsio::hdu::HduInfo;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{MasterColumn, QuickredFrame};

// ---------------------------------------------------------------------------
// Quickred file location
// ---------------------------------------------------------------------------

/// Quickred frame for a raw APOGEE exposure.
///
/// `<base>/archive/<date>/apR-a-<id>.apz` maps to
/// `<base>/quickred/<date>/ap1D-a-<id>.fits.fz`.
pub fn quickred_path(raw: &Path, exp_id: u64) -> Option<PathBuf> {
    let night = raw.parent()?;
    let date_id = night.file_name()?;
    let base = night.parent()?.parent()?;
    Some(
        base.join("quickred")
            .join(date_id)
            .join(format!("ap1D-a-{exp_id}.fits.fz")),
    )
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a quickred frame (one spectrum per fiber).  Dispatch by extension.
///
/// Supported formats:
/// * `.fits.fz` / `.fits` / `.fit` / `.gz` – FITS image in HDU 1, fibers on NAXIS2
/// * `.parquet` – `flux` list column, optional `fiber` column
/// * `.json`    – `[{ "fiber": 1, "flux": [...] }, ...]`
/// * `.csv`     – `fiber` and `flux` columns, flux semicolon-separated
pub fn load_frame(path: &Path) -> Result<QuickredFrame> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "fz" | "fits" | "fit" | "gz" => load_fits(path),
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// FITS loader
// ---------------------------------------------------------------------------

fn load_fits(path: &Path) -> Result<QuickredFrame> {
    let mut fits =
        FitsFile::open(path).with_context(|| format!("opening {}", path.display()))?;
    let hdu = fits.hdu(1).context("moving to HDU 1")?;

    // fitsio reports the image shape in C order: [NAXIS2, NAXIS1].
    let (n_fibers, n_pixels) = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => match shape.as_slice() {
            [rows, cols] => (*rows, *cols),
            other => bail!("expected a 2-D quickred image, got shape {other:?}"),
        },
        _ => bail!("HDU 1 of {} is not an image", path.display()),
    };

    let data: Vec<f64> = hdu
        .read_image(&mut fits)
        .with_context(|| format!("reading image from {}", path.display()))?;
    Ok(QuickredFrame::new(n_fibers, n_pixels, data)?)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records-oriented rows, one per fiber:
///
/// ```json
/// [
///   { "fiber": 1, "flux": [1021.5, 1019.0, ...] },
///   { "fiber": 2, "flux": [998.1, 1003.4, ...] }
/// ]
/// ```
fn load_json(path: &Path) -> Result<QuickredFrame> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        let fiber = match obj.get("fiber") {
            Some(v) => Some(
                v.as_u64()
                    .with_context(|| format!("Row {i}: 'fiber' is not a fiber number"))?,
            ),
            None => None,
        };
        let flux = json_array_to_f64(obj.get("flux"), i)?;
        rows.push((fiber, flux));
    }

    frame_from_rows(rows)
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid 'flux' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            // Masked pixels are written as null.
            if v.is_null() {
                return Ok(f64::NAN);
            }
            v.as_f64()
                .with_context(|| format!("Row {row}, flux[{j}]: not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row, a `flux` column of semicolon-separated floats and
/// an optional `fiber` column.
fn load_csv(path: &Path) -> Result<QuickredFrame> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let flux_idx = headers
        .iter()
        .position(|h| h == "flux")
        .context("CSV missing 'flux' column")?;
    let fiber_idx = headers.iter().position(|h| h == "fiber");

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let fiber = match fiber_idx {
            Some(idx) => {
                let raw = record.get(idx).unwrap_or("").trim();
                Some(
                    raw.parse::<u64>()
                        .with_context(|| format!("CSV row {row_no}: bad fiber '{raw}'"))?,
                )
            }
            None => None,
        };
        let flux = parse_semicolon_floats(record.get(flux_idx).unwrap_or(""), row_no)?;
        rows.push((fiber, flux));
    }

    frame_from_rows(rows)
}

fn parse_semicolon_floats(s: &str, row: usize) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, flux[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Expected schema:
/// - `flux`: List<Float64|Float32> or LargeList – one spectrum per row
/// - `fiber`: Int32 or Int64, optional – 1-based fiber ID
fn load_parquet(path: &Path) -> Result<QuickredFrame> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let flux_idx = schema
            .index_of("flux")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'flux' column"))?;
        let fiber_col = schema.index_of("fiber").ok().map(|i| batch.column(i));
        let flux_col = batch.column(flux_idx);

        for row in 0..batch.num_rows() {
            let flux = extract_f64_list(flux_col, row)
                .with_context(|| format!("Row {row}: failed to read 'flux'"))?;
            let fiber = match fiber_col {
                Some(col) => Some(
                    extract_fiber(col, row)
                        .with_context(|| format!("Row {row}: failed to read 'fiber'"))?,
                ),
                None => None,
            };
            rows.push((fiber, flux));
        }
    }

    frame_from_rows(rows)
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

fn extract_fiber(col: &Arc<dyn Array>, row: usize) -> Result<u64> {
    if col.is_null(row) {
        bail!("null fiber");
    }
    let value = if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        arr.value(row)
    } else if let Some(arr) = col.as_any().downcast_ref::<Int32Array>() {
        arr.value(row) as i64
    } else {
        bail!("fiber column is {:?}, expected Int32 or Int64", col.data_type())
    };
    u64::try_from(value).with_context(|| format!("negative fiber {value}"))
}

// ---------------------------------------------------------------------------
// Shared row assembly
// ---------------------------------------------------------------------------

/// Order rows by fiber ID when the source carries one.
///
/// Fiber IDs, when present, must be exactly `1..=N`.
fn frame_from_rows(mut rows: Vec<(Option<u64>, Vec<f64>)>) -> Result<QuickredFrame> {
    let with_ids = rows.iter().filter(|(f, _)| f.is_some()).count();
    if with_ids != 0 && with_ids != rows.len() {
        bail!("only {with_ids} of {} rows carry a fiber ID", rows.len());
    }
    if with_ids != 0 {
        rows.sort_by_key(|(f, _)| *f);
        for (i, (fiber, _)) in rows.iter().enumerate() {
            if *fiber != Some(i as u64 + 1) {
                bail!("fiber IDs must run 1..={}, found {fiber:?} at row {i}", rows.len());
            }
        }
    }
    Ok(QuickredFrame::from_rows(
        rows.into_iter().map(|(_, flux)| flux).collect(),
    )?)
}

// ---------------------------------------------------------------------------
// Master column
// ---------------------------------------------------------------------------

/// Load a master column: a JSON number or array, or a headerless CSV with
/// one value per line. A single value becomes a scalar master.
pub fn load_master_column(path: &Path) -> Result<MasterColumn> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let values: Vec<f64> = if ext == "json" {
        let text = std::fs::read_to_string(path).context("reading JSON file")?;
        match serde_json::from_str::<JsonValue>(&text).context("parsing JSON")? {
            JsonValue::Number(n) => vec![n.as_f64().context("master value out of range")?],
            JsonValue::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| v.as_f64().with_context(|| format!("master[{i}]: not a number")))
                .collect::<Result<_>>()?,
            _ => bail!("master column JSON must be a number or an array of numbers"),
        }
    } else {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .context("opening master column")?;
        reader
            .records()
            .enumerate()
            .map(|(i, rec)| {
                let rec = rec.with_context(|| format!("master row {i}"))?;
                let raw = rec.get(0).unwrap_or("").trim().to_string();
                raw.parse::<f64>()
                    .with_context(|| format!("master row {i}: '{raw}' is not a number"))
            })
            .collect::<Result<_>>()?
    };

    match values.as_slice() {
        [] => bail!("master column file {} is empty", path.display()),
        [v] => Ok(MasterColumn::Scalar(*v)),
        _ => Ok(MasterColumn::PerFiber(values)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Builder, ListBuilder};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fibercheck-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn quickred_path_follows_archive_layout() {
        let raw = Path::new("/data/apogee/archive/59000/apR-a-35880001.apz");
        assert_eq!(
            quickred_path(raw, 35880001).unwrap(),
            PathBuf::from("/data/apogee/quickred/59000/ap1D-a-35880001.fits.fz")
        );
        assert!(quickred_path(Path::new("apR-a-1.apz"), 1).is_none());
    }

    #[test]
    fn json_rows_are_ordered_by_fiber() {
        let path = scratch("frame.json");
        std::fs::write(
            &path,
            r#"[{"fiber": 2, "flux": [3.0, 4.0]}, {"fiber": 1, "flux": [1.0, null]}]"#,
        )
        .unwrap();
        let frame = load_frame(&path).unwrap();
        assert_eq!(frame.n_fibers, 2);
        assert_eq!(frame.row(1), &[3.0, 4.0]);
        assert!(frame.row(0)[1].is_nan());
    }

    #[test]
    fn csv_without_fiber_column_keeps_file_order() {
        let path = scratch("frame.csv");
        std::fs::write(&path, "flux\n\"1;2;3\"\n\"4;5;6\"\n").unwrap();
        let frame = load_frame(&path).unwrap();
        assert_eq!((frame.n_fibers, frame.n_pixels), (2, 3));
        assert_eq!(frame.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn gaps_in_fiber_ids_are_rejected() {
        let path = scratch("gappy.csv");
        std::fs::write(&path, "fiber,flux\n1,\"1;2\"\n3,\"1;2\"\n").unwrap();
        assert!(load_frame(&path).is_err());
    }

    #[test]
    fn parquet_frames_load() {
        let path = scratch("frame.parquet");
        let mut flux = ListBuilder::new(Float64Builder::new());
        for row in [[5.0, 6.0], [7.0, 8.0]] {
            flux.values().append_slice(&row);
            flux.append(true);
        }
        let fiber = Int64Array::from(vec![2, 1]);
        let schema = Arc::new(Schema::new(vec![
            Field::new("fiber", DataType::Int64, false),
            Field::new(
                "flux",
                DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
                false,
            ),
        ]));
        let batch =
            RecordBatch::try_new(schema.clone(), vec![Arc::new(fiber), Arc::new(flux.finish())])
                .unwrap();
        let mut writer = ArrowWriter::try_new(std::fs::File::create(&path).unwrap(), schema, None)
            .unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let frame = load_frame(&path).unwrap();
        assert_eq!(frame.row(0), &[7.0, 8.0]);
        assert_eq!(frame.row(1), &[5.0, 6.0]);
    }

    fn write_fits_image(path: &Path, dimensions: &[usize], data: &[f64]) {
        use fitsio::images::{ImageDescription, ImageType};

        if path.exists() {
            std::fs::remove_file(path).unwrap();
        }
        let description = ImageDescription {
            data_type: ImageType::Double,
            dimensions,
        };
        let mut fits = FitsFile::create(path).open().unwrap();
        let hdu = fits.create_image("FLUX".to_string(), &description).unwrap();
        hdu.write_image(&mut fits, data).unwrap();
    }

    #[test]
    fn fits_frames_have_one_row_per_fiber() {
        let path = scratch("ap1D-a-1.fits");
        let data: Vec<f64> = (0..12).map(f64::from).collect();
        // [NAXIS2, NAXIS1] = [fibers, pixels]
        write_fits_image(&path, &[3, 4], &data);

        let frame = load_frame(&path).unwrap();
        assert_eq!((frame.n_fibers, frame.n_pixels), (3, 4));
        assert_eq!(frame.row(0), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(frame.row(2), &[8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn one_dimensional_fits_image_is_rejected() {
        let path = scratch("ap1D-a-2.fits");
        write_fits_image(&path, &[5], &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let err = load_frame(&path).unwrap_err();
        assert!(format!("{err:#}").contains("2-D"), "{err:#}");
    }

    #[test]
    fn unknown_extension_is_an_error() {
        assert!(load_frame(Path::new("frame.txt")).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_frame(&scratch("absent.fits.fz")).is_err());
    }

    #[test]
    fn master_columns_from_json_and_csv() {
        let scalar = scratch("master_scalar.json");
        std::fs::write(&scalar, "1250.5").unwrap();
        assert_eq!(load_master_column(&scalar).unwrap(), MasterColumn::Scalar(1250.5));

        let vector = scratch("master_vec.csv");
        std::fs::write(&vector, "1.0\n2.0\n3.5\n").unwrap();
        assert_eq!(
            load_master_column(&vector).unwrap(),
            MasterColumn::PerFiber(vec![1.0, 2.0, 3.5])
        );

        let empty = scratch("master_empty.csv");
        std::fs::write(&empty, "").unwrap();
        assert!(load_master_column(&empty).is_err());
    }
}
