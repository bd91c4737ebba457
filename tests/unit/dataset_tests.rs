/*!
 * Tests for dataset reading and writing
 */

use aibridge::dataset::{read_input, DatasetFormat, OutputRow, OutputWriter, ResumeStore};
use aibridge::errors::DatasetError;

use crate::common;

#[test]
fn test_read_input_withUtf8Csv_shouldParseRows() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::write_input_csv(dir.path(), "input.csv", &[(1, "你好"), (2, "世界")]);

    let records = read_input(&path, None).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 1);
    assert_eq!(records[0].text, "你好");
    assert_eq!(records[1].text, "世界");
}

#[test]
fn test_read_input_withLegacyEncoding_shouldAutoDetect() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("legacy.csv");

    // GBK-encoded Chinese content, no declared encoding
    let header = b"id,text\r\n".to_vec();
    let (encoded, _, _) = encoding_rs::GBK.encode(
        "1,他们沿着河岸走了很久也没有说一句话夜色渐渐深了下来\r\n\
         2,第二天清晨村子里的人都聚集到了祠堂门口议论纷纷\r\n",
    );
    let mut bytes = header;
    bytes.extend_from_slice(&encoded);
    std::fs::write(&path, bytes).unwrap();

    let records = read_input(&path, None).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].text, "他们沿着河岸走了很久也没有说一句话夜色渐渐深了下来");
    assert_eq!(records[1].text, "第二天清晨村子里的人都聚集到了祠堂门口议论纷纷");
}

#[test]
fn test_read_input_withDeclaredEncoding_shouldUseIt() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("declared.csv");
    let (encoded, _, _) = encoding_rs::GBK.encode("id,text\n5,简体中文\n");
    std::fs::write(&path, encoded.into_owned()).unwrap();

    let records = read_input(&path, Some("gbk")).unwrap();
    assert_eq!(records[0].id, 5);
    assert_eq!(records[0].text, "简体中文");
}

#[test]
fn test_read_input_withUnknownEncodingLabel_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::write_input_csv(dir.path(), "input.csv", &[(1, "a")]);
    assert!(matches!(
        read_input(&path, Some("no-such-encoding")),
        Err(DatasetError::InputFormat(_))
    ));
}

#[test]
fn test_read_input_withMissingColumn_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("bad.csv");
    std::fs::write(&path, "id,content\n1,a\n").unwrap();

    let error = read_input(&path, None).unwrap_err();
    assert!(matches!(error, DatasetError::InputFormat(_)));
    assert!(error.to_string().contains("text"));
}

#[test]
fn test_read_input_withDuplicateIds_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::write_input_csv(dir.path(), "dup.csv", &[(1, "a"), (2, "b"), (1, "c")]);

    let error = read_input(&path, None).unwrap_err();
    assert!(error.to_string().contains("duplicate id 1"));
}

#[test]
fn test_read_input_withNonNumericId_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("badid.csv");
    std::fs::write(&path, "id,text\nfoo,a\n").unwrap();
    assert!(read_input(&path, None).is_err());
}

#[test]
fn test_read_input_withTsvExtension_shouldSplitOnTabs() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("input.tsv");
    std::fs::write(&path, "id\ttext\n1\ta,b still one field\n").unwrap();

    let records = read_input(&path, None).unwrap();
    assert_eq!(records[0].text, "a,b still one field");
}

#[test]
fn test_dataset_format_withUnknownExtension_shouldFail() {
    assert!(matches!(
        DatasetFormat::detect(std::path::Path::new("data.parquet")),
        Err(DatasetError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_output_writer_withRetainedRows_shouldCompactThenAppend() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("out.csv");

    // Simulate a dirty previous output: one done row survives compaction
    std::fs::write(
        &path,
        "id,raw,edit,status,reason\n1,a,old,done,\n2,b,,failed,timed out\n",
    )
    .unwrap();
    let state = ResumeStore::load(&path);
    assert_eq!(state.completed.iter().copied().collect::<Vec<_>>(), vec![1]);

    let mut writer = OutputWriter::create(&path, state.retained).unwrap();
    writer.append(OutputRow::done(2, "b", "fresh")).unwrap();
    drop(writer);

    let rows = common::read_output_csv(&path);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].edit, "old");
    assert_eq!(rows[1].id, 2);
    assert_eq!(rows[1].edit, "fresh");
}

#[test]
fn test_output_writer_xlsx_roundTripThroughResume() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("out.xlsx");

    let mut writer = OutputWriter::create(&path, Vec::new()).unwrap();
    writer.append(OutputRow::done(1, "源文", "translated")).unwrap();
    writer
        .append(OutputRow::failed(2, "source", "max retries exceeded (timed out)"))
        .unwrap();
    drop(writer);

    let state = ResumeStore::load(&path);
    assert_eq!(state.completed.iter().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(state.retained.len(), 1);
    assert_eq!(state.retained[0].edit, "translated");
    assert_eq!(state.retriable, 1);
}

#[test]
fn test_read_input_withXlsxDataset_shouldParseRows() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("input.xlsx");

    // Write an input-shaped workbook through the xlsx writer stack
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "id").unwrap();
    sheet.write_string(0, 1, "text").unwrap();
    sheet.write_number(1, 0, 7.0).unwrap();
    sheet.write_string(1, 1, "第一行").unwrap();
    sheet.write_number(2, 0, 8.0).unwrap();
    sheet.write_string(2, 1, "第二行").unwrap();
    workbook.save(&path).unwrap();

    let records = read_input(&path, None).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, 7);
    assert_eq!(records[0].text, "第一行");
    assert_eq!(records[1].id, 8);
}
