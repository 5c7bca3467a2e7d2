//! Buffered comment records and their CSV / JSON / XLSX exporters.
//!
//! Records are handed to the buffer post by post while the crawl runs, so an
//! interrupted run still exports everything collected so far.

use crate::core::config::{ExportFormat, ExportMode};
use crate::core::types::{CommentRecord, CrawlStats};
use crate::core::{CrawlResult, CrawlerConfig};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const UTF8_BOM: &str = "\u{feff}";
const POST_ID_MAX_CHARS: usize = 50;

/// Records grouped by post, in crawl order.
#[derive(Debug, Default)]
pub struct CommentBuffer {
    posts: Vec<(String, Vec<CommentRecord>)>,
}

impl CommentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_post(&mut self, post_url: &str, records: Vec<CommentRecord>) {
        debug!(
            "Added {} comments to buffer. Total: {}",
            records.len(),
            self.len() + records.len()
        );
        self.posts.push((post_url.to_string(), records));
    }

    pub fn records(&self) -> impl Iterator<Item = &CommentRecord> {
        self.posts.iter().flat_map(|(_, r)| r.iter())
    }

    pub fn by_post(&self) -> &[(String, Vec<CommentRecord>)] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.iter().map(|(_, r)| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CrawlStats {
        CrawlStats::from_records(self.records())
    }
}

/// Column set shared by CSV and XLSX files and the single-file JSON export.
#[derive(Serialize)]
struct ExportRow<'a> {
    post_url: &'a str,
    post_author: &'a str,
    post_timestamp: &'a str,
    comment_author_name: &'a str,
    comment_author_url: &'a str,
    comment_text: &'a str,
    comment_timestamp: &'a str,
    likes_count: u64,
    replies_count: u64,
    crawled_at: DateTime<Utc>,
}

impl ExportRow<'_> {
    const COLUMNS: [&'static str; 10] = [
        "post_url",
        "post_author",
        "post_timestamp",
        "comment_author_name",
        "comment_author_url",
        "comment_text",
        "comment_timestamp",
        "likes_count",
        "replies_count",
        "crawled_at",
    ];
}

impl<'a> From<&'a CommentRecord> for ExportRow<'a> {
    fn from(r: &'a CommentRecord) -> Self {
        Self {
            post_url: &r.post_url,
            post_author: &r.post_author,
            post_timestamp: &r.post_timestamp,
            comment_author_name: &r.comment_author_name,
            comment_author_url: &r.comment_author_url,
            comment_text: &r.comment_text,
            comment_timestamp: &r.comment_timestamp,
            likes_count: r.likes_count,
            replies_count: r.replies_count,
            crawled_at: r.crawled_at,
        }
    }
}

#[derive(Serialize)]
struct SingleMetadata<'a> {
    total_comments: usize,
    exported_at: String,
    username: &'a str,
}

#[derive(Serialize)]
struct PostMetadata<'a> {
    post_url: &'a str,
    total_comments: usize,
    exported_at: String,
}

#[derive(Serialize)]
struct JsonDocument<M, C> {
    metadata: M,
    comments: C,
}

pub struct Exporter {
    root: PathBuf,
    mode: ExportMode,
    format: ExportFormat,
}

impl Exporter {
    pub fn new(root: impl Into<PathBuf>, mode: ExportMode, format: ExportFormat) -> Self {
        Self {
            root: root.into(),
            mode,
            format,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.export_dir.clone(), config.export_mode, config.export_format)
    }

    /// Write the buffer in the configured mode and format(s). Returns every
    /// file written; an empty buffer writes nothing.
    pub fn export(&self, buffer: &CommentBuffer, username: Option<&str>) -> CrawlResult<Vec<PathBuf>> {
        if buffer.is_empty() {
            warn!("No comments to export");
            return Ok(Vec::new());
        }
        let mut written = Vec::new();
        match self.mode {
            ExportMode::Single => {
                let stem = single_file_stem(username, &timestamp_string());
                let records: Vec<&CommentRecord> = buffer.records().collect();
                if self.format.wants_csv() {
                    written.push(self.write_csv(&stem, &records)?);
                }
                if self.format.wants_json() {
                    written.push(self.write_single_json(&stem, &records, username)?);
                }
                if self.format.wants_xlsx() {
                    written.push(self.write_xlsx(&stem, &records)?);
                }
                info!("Exported {} comments", records.len());
            }
            ExportMode::PerPost => {
                for (post_url, records) in buffer.by_post() {
                    if records.is_empty() {
                        continue;
                    }
                    let post_id = extract_post_id(post_url);
                    let stem = format!(
                        "comments_{}_{}",
                        sanitize_filename(&post_id),
                        timestamp_string()
                    );
                    let refs: Vec<&CommentRecord> = records.iter().collect();
                    if self.format.wants_csv() {
                        written.push(self.write_csv(&stem, &refs)?);
                    }
                    if self.format.wants_json() {
                        written.push(self.write_post_json(&stem, post_url, records)?);
                    }
                    if self.format.wants_xlsx() {
                        written.push(self.write_xlsx(&stem, &refs)?);
                    }
                    info!(
                        "Exported {} comments from post {}",
                        records.len(),
                        post_id
                    );
                }
                info!("Exported comments to {} files", written.len());
            }
        }
        Ok(written)
    }

    fn subdir(&self, name: &str) -> CrawlResult<PathBuf> {
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn write_csv(&self, stem: &str, records: &[&CommentRecord]) -> CrawlResult<PathBuf> {
        let path = self.subdir("csv")?.join(format!("{}.csv", stem));
        write_csv_file(&path, records)?;
        info!("📄 CSV written to {}", path.display());
        Ok(path)
    }

    /// Workbooks land in the CSV directory.
    fn write_xlsx(&self, stem: &str, records: &[&CommentRecord]) -> CrawlResult<PathBuf> {
        let path = self.subdir("csv")?.join(format!("{}.xlsx", stem));
        write_xlsx_file(&path, records)?;
        info!("📄 XLSX written to {}", path.display());
        Ok(path)
    }

    fn write_single_json(
        &self,
        stem: &str,
        records: &[&CommentRecord],
        username: Option<&str>,
    ) -> CrawlResult<PathBuf> {
        let path = self.subdir("json")?.join(format!("{}.json", stem));
        let doc = JsonDocument {
            metadata: SingleMetadata {
                total_comments: records.len(),
                exported_at: Local::now().to_rfc3339(),
                username: username.unwrap_or("unknown"),
            },
            comments: records.iter().map(|r| ExportRow::from(*r)).collect::<Vec<_>>(),
        };
        std::fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
        info!("📄 JSON written to {}", path.display());
        Ok(path)
    }

    fn write_post_json(
        &self,
        stem: &str,
        post_url: &str,
        records: &[CommentRecord],
    ) -> CrawlResult<PathBuf> {
        let path = self.subdir("json")?.join(format!("{}.json", stem));
        let doc = JsonDocument {
            metadata: PostMetadata {
                post_url,
                total_comments: records.len(),
                exported_at: Local::now().to_rfc3339(),
            },
            comments: records,
        };
        std::fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
        info!("📄 JSON written to {}", path.display());
        Ok(path)
    }
}

/// UTF-8 with a byte-order mark so spreadsheet tools detect the encoding.
fn write_csv_file(path: &Path, records: &[&CommentRecord]) -> CrawlResult<()> {
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM.as_bytes())?;
    let mut writer = csv::Writer::from_writer(file);
    for record in records {
        writer.serialize(ExportRow::from(*record))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx_file(path: &Path, records: &[&CommentRecord]) -> CrawlResult<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Comments")?;
    for (col, name) in (0u16..).zip(ExportRow::COLUMNS) {
        sheet.write_string_with_format(0, col, name, &header)?;
    }
    for (row, record) in (1u32..).zip(records) {
        let r = ExportRow::from(*record);
        sheet.write_string(row, 0, r.post_url)?;
        sheet.write_string(row, 1, r.post_author)?;
        sheet.write_string(row, 2, r.post_timestamp)?;
        sheet.write_string(row, 3, r.comment_author_name)?;
        sheet.write_string(row, 4, r.comment_author_url)?;
        sheet.write_string(row, 5, r.comment_text)?;
        sheet.write_string(row, 6, r.comment_timestamp)?;
        sheet.write_number(row, 7, r.likes_count as f64)?;
        sheet.write_number(row, 8, r.replies_count as f64)?;
        sheet.write_string(row, 9, r.crawled_at.to_rfc3339_opts(SecondsFormat::AutoSi, true))?;
    }
    workbook.save(path)?;
    Ok(())
}

fn timestamp_string() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn single_file_stem(username: Option<&str>, timestamp: &str) -> String {
    match username {
        Some(u) if !u.is_empty() => format!("comments_{}_{}", sanitize_filename(u), timestamp),
        _ => format!("comments_{}", timestamp),
    }
}

/// Characters that are invalid in file names on common platforms become `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect()
}

/// Short identifier for a post URL, used in per-post file names.
pub fn extract_post_id(post_url: &str) -> String {
    fn segment_after<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
        let (_, rest) = url.rsplit_once(marker)?;
        rest.split(['/', '?', '&', '#']).next()
    }

    let id = segment_after(post_url, "/posts/")
        .or_else(|| segment_after(post_url, "/reel/"))
        .or_else(|| segment_after(post_url, "story_fbid="))
        .or_else(|| segment_after(post_url, "fbid="))
        .unwrap_or_else(|| {
            post_url
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .and_then(|s| s.split('?').next())
                .unwrap_or_default()
        });
    let id: String = id.chars().take(POST_ID_MAX_CHARS).collect();
    if id.is_empty() {
        "unknown".to_string()
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_ids_from_common_url_shapes() {
        assert_eq!(
            extract_post_id("https://www.facebook.com/page/posts/pfbid0abc?ref=x"),
            "pfbid0abc"
        );
        assert_eq!(extract_post_id("https://www.facebook.com/reel/987/"), "987");
        assert_eq!(
            extract_post_id("https://www.facebook.com/story.php?story_fbid=42&id=7"),
            "42"
        );
        assert_eq!(
            extract_post_id("https://www.facebook.com/photo/?fbid=13&set=a"),
            "13"
        );
        assert_eq!(
            extract_post_id("https://www.facebook.com/page/videos/555/"),
            "555"
        );
        let long = format!("https://www.facebook.com/p/posts/{}", "x".repeat(80));
        assert_eq!(extract_post_id(&long).len(), 50);
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_filename(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(
            single_file_stem(Some("some/page"), "20260101_120000"),
            "comments_some_page_20260101_120000"
        );
        assert_eq!(single_file_stem(None, "20260101_120000"), "comments_20260101_120000");
    }

    #[test]
    fn spreadsheet_columns_follow_csv_header() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let record = CommentRecord::new(
            &Default::default(),
            "comment_0".into(),
            Default::default(),
            Utc::now(),
        );
        writer.serialize(ExportRow::from(&record)).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out.lines().next(), Some(ExportRow::COLUMNS.join(",").as_str()));
    }

    #[test]
    fn empty_posts_do_not_count_toward_stats() {
        let mut buffer = CommentBuffer::new();
        buffer.push_post("https://www.facebook.com/p/posts/1", Vec::new());
        assert!(buffer.is_empty());
        assert_eq!(buffer.by_post().len(), 1);
        assert_eq!(buffer.stats(), CrawlStats::default());
    }
}
