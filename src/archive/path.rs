//! Mapping captured resource URLs onto paths inside the run's `archive/`
//! directory.
//!
//! Same-origin resources keep their URL path; cross-origin resources are
//! nested under a directory named after their host. Every segment goes through
//! [`sanitize`], so the result is legal on common filesystems and can never
//! climb out of the archive directory.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;
use url::Url;

use super::manifest::ERRORS_FILE;
use super::SourceMap;
use crate::naming::sanitize;
use crate::types::{ResourceArchive, ResourceEntry};

const DIRECTORY_INDEX_STEM: &str = "index";
const DIRECTORY_INDEX_EXT: &str = "html";

/// Schemes whose content lives in the URL itself; nothing to archive.
const INLINE_SCHEMES: &[&str] = &["data", "blob"];

/// A resource paired with the relative path it will be written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub url: String,
    pub relative_path: String,
}

/// Outcome of resolving a whole archive.
#[derive(Debug, Clone, Default)]
pub struct ResolvedArchive {
    /// Successful entries with unique relative paths, ordered by URL.
    pub files: Vec<ArchivedFile>,
    /// Successful entries whose URL has no archivable path (unparseable, or
    /// without a host). `data:` and `blob:` URLs are skipped, not listed.
    pub unresolved: Vec<String>,
    /// Failed captures, URL to error message.
    pub failures: BTreeMap<String, String>,
    source_map: SourceMap,
}

impl ResolvedArchive {
    /// Asset reference to relative path, for every form a snapshot may use to
    /// refer to an archived file.
    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    pub fn into_source_map(self) -> SourceMap {
        self.source_map
    }
}

/// Resolve the relative path for a single entry.
///
/// Returns `None` for failures and for URLs without a hierarchical path.
/// Collisions between entries are only handled by [`resolve_all`].
pub fn resolve(entry: &ResourceEntry, url: &str, page_url: &str) -> Option<String> {
    if entry.is_failure() {
        return None;
    }
    let url = Url::parse(url).ok()?;
    let page = Url::parse(page_url).ok();
    naive_path(&url, page.as_ref(), entry.header("content-type"))
}

/// Resolve every entry of `archive`, guaranteeing unique relative paths.
///
/// When several URLs sanitize to the same path, the lexicographically first
/// URL keeps it and every other one gets a suffix derived from a SHA-256 of
/// its URL, so the outcome depends only on the set of URLs. A file whose path
/// is also a directory of another file is suffixed the same way, and names
/// the writer reserves (`errors.json`) are never handed out.
pub fn resolve_all(archive: &ResourceArchive, page_url: &str) -> ResolvedArchive {
    resolve_within(archive, page_url, &OccupiedPaths::default())
}

/// [`resolve_all`] into a directory that already holds files. A path owned by
/// a different URL is never reused; a path already holding the same URL is.
pub fn resolve_within(
    archive: &ResourceArchive,
    page_url: &str,
    occupied: &OccupiedPaths,
) -> ResolvedArchive {
    let page = Url::parse(page_url).ok();
    let mut resolved = ResolvedArchive::default();
    let mut groups: BTreeMap<String, Vec<(&str, Url)>> = BTreeMap::new();

    for (url, entry) in archive {
        if let ResourceEntry::Failure { error } = entry {
            resolved.failures.insert(url.clone(), error.clone());
            continue;
        }
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => {
                resolved.unresolved.push(url.clone());
                continue;
            }
        };
        if INLINE_SCHEMES.contains(&parsed.scheme()) {
            debug!(url = %truncated(url), "skipping inline resource");
            continue;
        }
        match naive_path(&parsed, page.as_ref(), entry.header("content-type")) {
            Some(path) => groups.entry(path).or_default().push((url.as_str(), parsed)),
            None => resolved.unresolved.push(url.clone()),
        }
    }

    let mut taken: HashSet<String> = groups.keys().cloned().collect();
    let mut dirs: HashSet<String> = groups
        .keys()
        .flat_map(|path| ancestors(path))
        .map(str::to_string)
        .collect();
    let mut assigned: Vec<(String, Url, String)> = Vec::with_capacity(archive.len());

    for (path, members) in groups {
        for (index, (url, parsed)) in members.into_iter().enumerate() {
            let relative_path =
                if index == 0 && !dirs.contains(&path) && occupied.admits(&path, url) {
                    path.clone()
                } else {
                    let unique = unique_path(&path, url, occupied, |candidate| {
                        !taken.contains(candidate)
                            && !dirs.contains(candidate)
                            && occupied.admits(candidate, url)
                    });
                    taken.insert(unique.clone());
                    dirs.extend(ancestors(&unique).map(str::to_string));
                    unique
                };
            assigned.push((url.to_string(), parsed, relative_path));
        }
    }

    assigned.sort_by(|a, b| a.0.cmp(&b.0));
    for (url, parsed, relative_path) in assigned {
        for key in reference_forms(&url, &parsed, page.as_ref()) {
            resolved.source_map.insert(key, relative_path.clone());
        }
        resolved.files.push(ArchivedFile { url, relative_path });
    }

    resolved
}

/// Paths already in use inside an archive directory.
///
/// Every file records the URL archived there, or `None` for names the writer
/// keeps for itself. The directories those files imply are tracked as well,
/// since a file and a directory cannot share a path.
#[derive(Debug, Clone)]
pub struct OccupiedPaths {
    files: HashMap<String, Option<String>>,
    dirs: HashSet<String>,
}

impl Default for OccupiedPaths {
    fn default() -> Self {
        let mut occupied = Self {
            files: HashMap::new(),
            dirs: HashSet::new(),
        };
        occupied.reserve(ERRORS_FILE);
        occupied
    }
}

impl OccupiedPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `path` away from every resource.
    pub fn reserve(&mut self, path: &str) {
        self.insert(path, None);
    }

    /// Record that `url` was archived at `path`.
    pub fn claim(&mut self, path: &str, url: &str) {
        self.insert(path, Some(url.to_string()));
    }

    /// URL archived at `path`; `Some(None)` for reserved names.
    pub fn owner(&self, path: &str) -> Option<Option<&str>> {
        self.files.get(path).map(Option::as_deref)
    }

    fn insert(&mut self, path: &str, owner: Option<String>) {
        self.dirs.extend(ancestors(path).map(str::to_string));
        self.files.insert(path.to_string(), owner);
    }

    /// Whether `url` can be written to `path` without clobbering anything.
    fn admits(&self, path: &str, url: &str) -> bool {
        let owned_elsewhere = match self.files.get(path) {
            Some(Some(owner)) => owner != url,
            Some(None) => true,
            None => false,
        };
        !owned_elsewhere
            && !self.dirs.contains(path)
            && !ancestors(path).any(|dir| self.files.contains_key(dir))
    }

    /// Rename each directory of `path` that is already a file here.
    fn reroute(&self, path: &str, suffix: &str) -> String {
        let mut segments: Vec<String> = path.split('/').map(str::to_string).collect();
        for i in 0..segments.len().saturating_sub(1) {
            if self.files.contains_key(&segments[..=i].join("/")) {
                segments[i] = format!("{}-{suffix}", segments[i]);
            }
        }
        segments.join("/")
    }
}

fn unique_path(
    path: &str,
    url: &str,
    occupied: &OccupiedPaths,
    is_free: impl Fn(&str) -> bool,
) -> String {
    let mut fallback = String::new();
    for len in [8, 16, 64] {
        let hash = short_hash(url, len);
        let rerouted = occupied.reroute(path, &hash);
        if rerouted != path && is_free(&rerouted) {
            return rerouted;
        }
        let suffixed = with_suffix(&rerouted, &hash);
        if is_free(&suffixed) {
            return suffixed;
        }
        fallback = suffixed;
    }
    fallback
}

/// Every proper directory prefix of a relative path, outermost first.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(i, _)| &path[..i])
}

fn truncated(url: &str) -> &str {
    match url.char_indices().nth(64) {
        Some((i, _)) => &url[..i],
        None => url,
    }
}

fn naive_path(url: &Url, page: Option<&Url>, content_type: Option<&str>) -> Option<String> {
    let host = url.host_str()?;
    let mut segments: Vec<String> = Vec::new();

    let same_origin = page.is_some_and(|page| page.origin() == url.origin());
    if !same_origin {
        let host_segment = match url.port() {
            Some(port) => sanitize(&format!("{host}-{port}")),
            None => sanitize(host),
        };
        if !host_segment.is_empty() {
            segments.push(host_segment);
        }
    }

    let raw: Vec<&str> = url
        .path_segments()
        .map(|parts| parts.filter(|part| !part.is_empty()).collect())
        .unwrap_or_default();
    let is_directory = url.path().ends_with('/') || raw.is_empty();
    let (dirs, file) = match raw.split_last() {
        Some((last, dirs)) if !is_directory => (dirs, Some(*last)),
        _ => (raw.as_slice(), None),
    };

    segments.extend(
        dirs.iter()
            .map(|dir| sanitize(&percent_decode(dir)))
            .filter(|dir| !dir.is_empty()),
    );

    let (mut stem, mut ext) = match file {
        Some(name) => split_file_name(&percent_decode(name)),
        None => (
            DIRECTORY_INDEX_STEM.to_string(),
            Some(DIRECTORY_INDEX_EXT.to_string()),
        ),
    };
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        stem = format!("{stem}-{}", short_hash(query, 8));
    }
    if ext.is_none() {
        ext = content_type
            .and_then(extension_for_content_type)
            .map(str::to_string);
    }

    segments.push(match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    });
    Some(segments.join("/"))
}

fn split_file_name(name: &str) -> (String, Option<String>) {
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let stem = sanitize(stem);
    let stem = if stem.is_empty() {
        DIRECTORY_INDEX_STEM.to_string()
    } else {
        stem
    };
    let ext = ext
        .map(|ext| sanitize(ext).replace('-', ""))
        .filter(|ext| !ext.is_empty());
    (stem, ext)
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("00");
            out.push(u8::from_str_radix(hex, 16).unwrap_or(0));
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Insert `-suffix` before the extension of the final segment.
fn with_suffix(path: &str, suffix: &str) -> String {
    let (dir, file) = match path.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, path),
    };
    let file = match file.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{suffix}.{ext}"),
        None => format!("{file}-{suffix}"),
    };
    match dir {
        Some(dir) => format!("{dir}/{file}"),
        None => file,
    }
}

fn short_hash(input: &str, len: usize) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.truncate(len);
    hex
}

/// Strings a snapshot may use for this resource: the captured URL itself and,
/// for same-origin resources, the root-relative path (with query).
fn reference_forms(raw: &str, url: &Url, page: Option<&Url>) -> Vec<String> {
    let mut forms = vec![raw.to_string()];
    if url.as_str() != raw {
        forms.push(url.as_str().to_string());
    }
    if page.is_some_and(|page| page.origin() == url.origin()) {
        let mut relative = url.path().to_string();
        if let Some(query) = url.query() {
            relative.push('?');
            relative.push_str(query);
        }
        forms.push(relative);
    }
    forms
}

fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let ext = match mime.as_str() {
        "text/html" | "application/xhtml+xml" => "html",
        "text/css" => "css",
        "text/javascript" | "application/javascript" | "application/x-javascript" => "js",
        "application/json" => "json",
        "image/svg+xml" => "svg",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "font/woff" | "application/font-woff" => "woff",
        "font/woff2" => "woff2",
        "font/ttf" | "application/x-font-ttf" => "ttf",
        "font/otf" => "otf",
        _ => return None,
    };
    Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PAGE: &str = "http://x/";

    fn ok() -> ResourceEntry {
        ResourceEntry::success(200, b"body".to_vec())
    }

    fn typed(content_type: &str) -> ResourceEntry {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        ResourceEntry::Success {
            body: Vec::new(),
            headers,
            status: 200,
        }
    }

    #[test]
    fn same_origin_keeps_url_path() {
        assert_eq!(resolve(&ok(), "http://x/a.png", PAGE).as_deref(), Some("a.png"));
        assert_eq!(
            resolve(&ok(), "http://x/static/img/Logo Big.PNG", PAGE).as_deref(),
            Some("static/img/logo-big.png")
        );
    }

    #[test]
    fn directory_urls_map_to_index_html() {
        assert_eq!(resolve(&ok(), "http://x/", PAGE).as_deref(), Some("index.html"));
        assert_eq!(
            resolve(&ok(), "http://x/docs/", PAGE).as_deref(),
            Some("docs/index.html")
        );
    }

    #[test]
    fn cross_origin_nests_under_host() {
        assert_eq!(
            resolve(&ok(), "https://cdn.example.com:8443/lib/app.js", PAGE).as_deref(),
            Some("cdn-example-com-8443/lib/app.js")
        );
    }

    #[test]
    fn failures_and_opaque_urls_do_not_resolve() {
        assert_eq!(resolve(&ResourceEntry::failure("timeout"), "http://x/b.png", PAGE), None);
        assert_eq!(resolve(&ok(), "data:image/png;base64,AAAA", PAGE), None);
        assert_eq!(resolve(&ok(), "not a url", PAGE), None);
    }

    #[test]
    fn parent_segments_cannot_escape() {
        let path = resolve(&ok(), "http://x/a/../../../etc/passwd", PAGE).unwrap();
        assert_eq!(path, "etc/passwd");
        let path = resolve(&ok(), "http://x/a/%2E%2E/b.css", PAGE).unwrap();
        assert!(!path.split('/').any(|seg| seg == ".." || seg.is_empty()));
    }

    #[test]
    fn missing_extension_is_inferred_from_content_type() {
        assert_eq!(
            resolve(&typed("text/css; charset=utf-8"), "http://x/styles", PAGE).as_deref(),
            Some("styles.css")
        );
        assert_eq!(
            resolve(&typed("application/octet-stream"), "http://x/blob", PAGE).as_deref(),
            Some("blob")
        );
    }

    #[test]
    fn query_strings_get_distinct_suffixes() {
        let v1 = resolve(&ok(), "http://x/app.js?v=1", PAGE).unwrap();
        let v2 = resolve(&ok(), "http://x/app.js?v=2", PAGE).unwrap();
        assert_ne!(v1, v2);
        assert!(v1.starts_with("app-") && v1.ends_with(".js"));
    }

    #[test]
    fn colliding_urls_get_distinct_paths() {
        let mut archive = ResourceArchive::new();
        archive.insert("http://x/My File.png".into(), ok());
        archive.insert("http://x/my-file.png".into(), ok());
        archive.insert("http://x/my_file.png".into(), ok());

        let resolved = resolve_all(&archive, PAGE);
        let paths: HashSet<_> = resolved.files.iter().map(|f| f.relative_path.clone()).collect();
        assert_eq!(paths.len(), 3);
        // First URL in sort order keeps the plain path.
        let first = &resolved.files[0];
        assert_eq!(first.url, "http://x/My File.png");
        assert_eq!(first.relative_path, "my-file.png");

        // Deterministic across runs.
        let again = resolve_all(&archive, PAGE);
        assert_eq!(resolved.files, again.files);
    }

    #[test]
    fn source_map_covers_absolute_and_root_relative_references() {
        let mut archive = ResourceArchive::new();
        archive.insert("http://x/img/a.png?w=2".into(), ok());
        archive.insert("https://cdn.test/font.woff2".into(), ok());
        archive.insert("http://x/b.png".into(), ResourceEntry::failure("timeout"));

        let resolved = resolve_all(&archive, PAGE);
        let map = resolved.source_map();
        let path = map.get("http://x/img/a.png?w=2").cloned().unwrap();
        assert_eq!(map.get("/img/a.png?w=2"), Some(&path));
        assert_eq!(map.get("https://cdn.test/font.woff2").map(String::as_str), Some("cdn-test/font.woff2"));
        assert!(!map.contains_key("/font.woff2"));
        assert!(!map.contains_key("http://x/b.png"));
        assert_eq!(resolved.failures.get("http://x/b.png").map(String::as_str), Some("timeout"));
    }

    #[test]
    fn reserved_report_name_is_never_handed_out() {
        let mut archive = ResourceArchive::new();
        archive.insert("http://x/errors.json".into(), ok());

        let resolved = resolve_all(&archive, PAGE);
        let path = &resolved.files[0].relative_path;
        assert_ne!(path, ERRORS_FILE);
        assert!(path.starts_with("errors-") && path.ends_with(".json"));
        assert_eq!(resolved.source_map().get("/errors.json"), Some(path));
    }

    #[test]
    fn file_that_is_also_a_directory_gets_a_suffix() {
        let mut archive = ResourceArchive::new();
        archive.insert("http://x/dir".into(), ok());
        archive.insert("http://x/dir/b.css".into(), ok());

        let resolved = resolve_all(&archive, PAGE);
        let by_url: HashMap<_, _> = resolved
            .files
            .iter()
            .map(|f| (f.url.as_str(), f.relative_path.as_str()))
            .collect();
        assert_eq!(by_url["http://x/dir/b.css"], "dir/b.css");
        assert_eq!(by_url["http://x/dir"], format!("dir-{}", short_hash("http://x/dir", 8)));
    }

    #[test]
    fn occupied_paths_owned_by_other_urls_are_avoided() {
        let mut occupied = OccupiedPaths::new();
        occupied.claim("logo.png", "http://a.test/logo.png");
        occupied.claim("dir", "http://a.test/dir");
        occupied.claim("fonts/a.woff2", "http://a.test/fonts/a.woff2");

        let mut archive = ResourceArchive::new();
        archive.insert("http://b.test/logo.png".into(), ok());
        archive.insert("http://b.test/dir/b.css".into(), ok());
        archive.insert("http://b.test/fonts".into(), ok());
        let resolved = resolve_within(&archive, "http://b.test/", &occupied);
        let by_url: HashMap<_, _> = resolved
            .files
            .iter()
            .map(|f| (f.url.as_str(), f.relative_path.as_str()))
            .collect();

        let logo = by_url["http://b.test/logo.png"];
        assert!(logo.starts_with("logo-") && logo.ends_with(".png"));
        let css = by_url["http://b.test/dir/b.css"];
        assert!(css.starts_with("dir-") && css.ends_with("/b.css"), "{css}");
        assert_ne!(by_url["http://b.test/fonts"], "fonts");
        for path in by_url.values() {
            assert!(occupied.owner(path).is_none());
        }
    }

    #[test]
    fn path_already_holding_the_same_url_is_reused() {
        let mut occupied = OccupiedPaths::new();
        occupied.claim("a.png", "http://x/a.png");
        let mut archive = ResourceArchive::new();
        archive.insert("http://x/a.png".into(), ok());

        let resolved = resolve_within(&archive, PAGE, &occupied);
        assert_eq!(resolved.files[0].relative_path, "a.png");
    }

    #[test]
    fn inline_urls_are_neither_archived_nor_unresolved() {
        let mut archive = ResourceArchive::new();
        archive.insert("data:image/png;base64,AAAA".into(), ok());
        archive.insert("blob:http://x/5f1c".into(), ok());
        archive.insert("mailto:someone@x".into(), ok());

        let resolved = resolve_all(&archive, PAGE);
        assert!(resolved.files.is_empty());
        assert_eq!(resolved.unresolved, vec!["mailto:someone@x".to_string()]);
    }

    fn is_legal_segment(segment: &str, last: bool) -> bool {
        let (stem, ext) = match segment.rsplit_once('.') {
            Some((stem, ext)) if last => (stem, Some(ext)),
            _ => (segment, None),
        };
        let stem_ok = !stem.is_empty()
            && !stem.starts_with('-')
            && !stem.ends_with('-')
            && !stem.contains("--")
            && stem
                .chars()
                .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_lowercase());
        let ext_ok = ext.map_or(true, |ext| {
            !ext.is_empty() && ext.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        });
        stem_ok && ext_ok
    }

    proptest! {
        #[test]
        fn resolved_paths_are_legal(
            host in "[a-z]{1,8}(\\.[a-z]{2,3})?",
            segments in proptest::collection::vec("[ -~]{0,12}", 0..5),
            trailing in any::<bool>(),
        ) {
            let encoded: Vec<String> = segments
                .iter()
                .map(|s| s.replace('%', "%25").replace('#', "%23").replace('?', "%3F"))
                .collect();
            let mut raw = format!("http://{host}/{}", encoded.join("/"));
            if trailing {
                raw.push('/');
            }
            if let Some(path) = resolve(&ok(), &raw, "http://page.test/") {
                let parts: Vec<&str> = path.split('/').collect();
                let count = parts.len();
                for (i, part) in parts.iter().enumerate() {
                    prop_assert!(is_legal_segment(part, i + 1 == count), "illegal segment {:?} in {:?} from {:?}", part, path, raw);
                }
            }
        }

        #[test]
        fn distinct_urls_never_share_a_path(names in proptest::collection::btree_set("[A-Za-z _.-]{1,6}", 2..8)) {
            let mut archive = ResourceArchive::new();
            for name in &names {
                archive.insert(format!("http://x/{}", name.replace(' ', "%20")), ok());
                archive.insert(format!("http://x/{}/inner.css", name.replace(' ', "%20")), ok());
            }
            let resolved = resolve_all(&archive, PAGE);
            let paths: HashSet<_> = resolved.files.iter().map(|f| f.relative_path.as_str()).collect();
            prop_assert_eq!(paths.len(), resolved.files.len());
            for path in &paths {
                prop_assert!(ancestors(path).all(|dir| !paths.contains(dir)));
            }
        }
    }
}
