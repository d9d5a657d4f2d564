//! Point DOM snapshot asset references at archived files.

use url::Url;

use super::SourceMap;
use crate::types::DomSnapshot;

/// Attributes whose values reference a fetched resource.
const ASSET_ATTRIBUTES: &[&str] = &["src", "href", "poster", "data", "xlink:href", "background"];

/// Return a copy of `snapshot` with every asset reference found in
/// `source_map` replaced by its archived path. Values that are not keys of the
/// map are resolved against `page` (page-relative and protocol-relative
/// references) and looked up again; anything still unknown is left as it was.
/// The input snapshot is not modified.
pub fn rewrite(
    snapshot: &DomSnapshot,
    source_map: &SourceMap,
    page: Option<&Url>,
) -> DomSnapshot {
    let mut rewritten = snapshot.clone();
    if source_map.is_empty() {
        return rewritten;
    }

    rewritten.for_each_attribute_mut(|name, value| {
        let name = name.to_ascii_lowercase();
        if name == "srcset" {
            if let Some(mapped) = rewrite_srcset(value, source_map, page) {
                *value = mapped;
            }
        } else if ASSET_ATTRIBUTES.contains(&name.as_str()) {
            if let Some(mapped) = lookup(value, source_map, page) {
                *value = mapped.clone();
            }
        }
    });
    rewritten
}

/// `srcset` holds comma-separated `url [descriptor]` candidates; each URL is
/// looked up on its own.
fn rewrite_srcset(srcset: &str, source_map: &SourceMap, page: Option<&Url>) -> Option<String> {
    let mut changed = false;
    let candidates: Vec<String> = srcset
        .split(',')
        .map(|candidate| {
            let trimmed = candidate.trim();
            let (url, descriptor) = match trimmed.split_once(char::is_whitespace) {
                Some((url, descriptor)) => (url, Some(descriptor.trim())),
                None => (trimmed, None),
            };
            let url = match lookup(url, source_map, page) {
                Some(mapped) => {
                    changed = true;
                    mapped.as_str()
                }
                None => url,
            };
            match descriptor {
                Some(descriptor) if !descriptor.is_empty() => format!("{url} {descriptor}"),
                _ => url.to_string(),
            }
        })
        .collect();

    changed.then(|| candidates.join(", "))
}

fn lookup<'a>(
    reference: &str,
    source_map: &'a SourceMap,
    page: Option<&Url>,
) -> Option<&'a String> {
    if let Some(mapped) = source_map.get(reference) {
        return Some(mapped);
    }
    let mut absolute = page?.join(reference.trim()).ok()?;
    absolute.set_fragment(None);
    source_map.get(absolute.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, &str)]) -> SourceMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn snapshot() -> DomSnapshot {
        DomSnapshot::new(json!({
            "type": 0,
            "childNodes": [{
                "type": 2,
                "tagName": "html",
                "attributes": {},
                "childNodes": [
                    { "type": 2, "tagName": "img", "attributes": { "src": "http://x/a.png", "alt": "http://x/a.png" } },
                    { "type": 2, "tagName": "link", "attributes": { "rel": "stylesheet", "href": "/styles.css" } },
                    { "type": 2, "tagName": "img", "attributes": { "src": "https://elsewhere.test/c.png" } },
                    { "type": 2, "tagName": "img", "attributes": { "srcset": "http://x/a.png 1x, /hi.png 2x" } }
                ]
            }]
        }))
    }

    #[test]
    fn rewrites_mapped_references_and_preserves_the_rest() {
        let source_map = map(&[
            ("http://x/a.png", "a.png"),
            ("/styles.css", "styles.css"),
        ]);
        let original = snapshot();
        let rewritten = rewrite(&original, &source_map, None);
        let nodes = &rewritten.as_value()["childNodes"][0]["childNodes"];

        assert_eq!(nodes[0]["attributes"]["src"], json!("a.png"));
        // Non-asset attributes are never touched, even when they match.
        assert_eq!(nodes[0]["attributes"]["alt"], json!("http://x/a.png"));
        assert_eq!(nodes[1]["attributes"]["href"], json!("styles.css"));
        assert_eq!(nodes[2]["attributes"]["src"], json!("https://elsewhere.test/c.png"));
        assert_eq!(nodes[3]["attributes"]["srcset"], json!("a.png 1x, /hi.png 2x"));
    }

    #[test]
    fn input_snapshot_is_left_untouched() {
        let original = snapshot();
        let before = original.clone();
        let _ = rewrite(&original, &map(&[("http://x/a.png", "a.png")]), None);
        assert_eq!(original, before);
    }

    #[test]
    fn empty_source_map_is_identity() {
        let original = snapshot();
        assert_eq!(rewrite(&original, &SourceMap::new(), None), original);
    }

    #[test]
    fn every_mapped_reference_lands_at_the_same_position() {
        let source_map = map(&[
            ("http://x/a.png", "a.png"),
            ("/styles.css", "styles.css"),
            ("/hi.png", "hi.png"),
        ]);
        let original = snapshot();
        let rewritten = rewrite(&original, &source_map, None);

        let before = original.attributes();
        let after = rewritten.attributes();
        assert_eq!(before.len(), after.len());
        for ((name, old), (new_name, new)) in before.iter().zip(after.iter()) {
            assert_eq!(name, new_name);
            if name == "srcset" {
                continue;
            }
            match source_map.get(old) {
                Some(mapped) if ASSET_ATTRIBUTES.contains(&name.as_str()) => assert_eq!(new, mapped),
                _ => assert_eq!(new, old),
            }
        }
    }

    #[test]
    fn page_relative_references_resolve_against_the_page() {
        let mut archive = crate::types::ResourceArchive::new();
        archive.insert(
            "http://x/docs/img/Logo Big.PNG".into(),
            crate::types::ResourceEntry::success(200, b"png".to_vec()),
        );
        let page_url = "http://x/docs/page.html";
        let resolved = crate::archive::resolve_all(&archive, page_url);
        let page = Url::parse(page_url).unwrap();
        let original = DomSnapshot::new(json!({
            "childNodes": [
                { "attributes": { "src": "img/Logo Big.PNG" } },
                { "attributes": { "src": "//x/docs/img/Logo%20Big.PNG" } },
                { "attributes": { "src": "../docs/img/Logo%20Big.PNG#top" } },
                { "attributes": { "srcset": "img/Logo%20Big.PNG 2x" } },
                { "attributes": { "src": "img/missing.png" } }
            ]
        }));

        let rewritten = rewrite(&original, resolved.source_map(), Some(&page));
        let nodes = &rewritten.as_value()["childNodes"];

        assert_eq!(nodes[0]["attributes"]["src"], json!("docs/img/logo-big.png"));
        assert_eq!(nodes[1]["attributes"]["src"], json!("docs/img/logo-big.png"));
        assert_eq!(nodes[2]["attributes"]["src"], json!("docs/img/logo-big.png"));
        assert_eq!(nodes[3]["attributes"]["srcset"], json!("docs/img/logo-big.png 2x"));
        assert_eq!(nodes[4]["attributes"]["src"], json!("img/missing.png"));
    }
}
