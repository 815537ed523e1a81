//! MIME structure traversal and attachment discovery
//!
//! Normalizes the `BODYSTRUCTURE` reported by the server into an owned
//! [`StructureNode`] tree, flattens it into [`PartDescriptor`]s and scans
//! those for filename-bearing parts. Everything here is pure; the only
//! protocol call happens before [`StructureNode::from_body_structure`].

use std::fmt;

use imap_proto::types::{BodyStructure, ContentEncoding};

use crate::mime;

/// Content-Transfer-Encoding of a single part
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
    Other(String),
}

impl TransferEncoding {
    /// Header value suitable for a `Content-Transfer-Encoding` line
    pub fn as_str(&self) -> &str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ContentEncoding<'_>> for TransferEncoding {
    fn from(value: &ContentEncoding<'_>) -> Self {
        match value {
            ContentEncoding::SevenBit => Self::SevenBit,
            ContentEncoding::EightBit => Self::EightBit,
            ContentEncoding::Binary => Self::Binary,
            ContentEncoding::Base64 => Self::Base64,
            ContentEncoding::QuotedPrintable => Self::QuotedPrintable,
            ContentEncoding::Other(name) => Self::Other(name.to_ascii_lowercase()),
        }
    }
}

/// Attribute/value pairs as listed in a parameter list
pub type Params = Vec<(String, String)>;

/// One node of the reported MIME structure
///
/// `parts` is non-empty only for multipart bodies and embedded
/// `message/rfc822` parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureNode {
    /// Declared `type/subtype`, lowercased
    pub mime_type: String,
    /// Transfer encoding (`7bit` for multipart containers)
    pub encoding: TransferEncoding,
    /// Encoded size in octets; `None` when the server reports none
    pub bytes: Option<u64>,
    /// Content-Type parameters; `None` when the part lists none
    pub parameters: Option<Params>,
    /// Content-Disposition parameters; `None` when the part has no disposition
    /// or the disposition lists none
    pub disposition_parameters: Option<Params>,
    /// Child parts
    pub parts: Vec<StructureNode>,
}

impl StructureNode {
    /// Normalize an `imap-proto` body structure
    ///
    /// An embedded message becomes a node whose children are the parts of
    /// the enclosed message: the subparts of its body when that body is
    /// multipart, otherwise the body itself. This keeps child positions in
    /// line with IMAP section numbering (`2.1`, `2.2`, ...).
    pub fn from_body_structure(body: &BodyStructure<'_>) -> Self {
        match body {
            BodyStructure::Basic { common, other, .. }
            | BodyStructure::Text { common, other, .. } => Self {
                mime_type: mime_type(&common.ty.ty, &common.ty.subtype),
                encoding: TransferEncoding::from(&other.transfer_encoding),
                bytes: Some(u64::from(other.octets)),
                parameters: owned_params(common.ty.params.as_deref()),
                disposition_parameters: common
                    .disposition
                    .as_ref()
                    .and_then(|d| owned_params(d.params.as_deref())),
                parts: Vec::new(),
            },
            BodyStructure::Message {
                common,
                other,
                body: inner,
                ..
            } => {
                let parts = match inner.as_ref() {
                    BodyStructure::Multipart { bodies, .. } => {
                        bodies.iter().map(Self::from_body_structure).collect()
                    }
                    single => vec![Self::from_body_structure(single)],
                };
                Self {
                    mime_type: mime_type(&common.ty.ty, &common.ty.subtype),
                    encoding: TransferEncoding::from(&other.transfer_encoding),
                    bytes: Some(u64::from(other.octets)),
                    parameters: owned_params(common.ty.params.as_deref()),
                    disposition_parameters: common
                        .disposition
                        .as_ref()
                        .and_then(|d| owned_params(d.params.as_deref())),
                    parts,
                }
            }
            BodyStructure::Multipart { common, bodies, .. } => Self {
                mime_type: mime_type(&common.ty.ty, &common.ty.subtype),
                encoding: TransferEncoding::SevenBit,
                bytes: None,
                parameters: owned_params(common.ty.params.as_deref()),
                disposition_parameters: common
                    .disposition
                    .as_ref()
                    .and_then(|d| owned_params(d.params.as_deref())),
                parts: bodies.iter().map(Self::from_body_structure).collect(),
            },
        }
    }
}

fn mime_type(ty: &str, subtype: &str) -> String {
    format!("{ty}/{subtype}").to_ascii_lowercase()
}

fn owned_params<K, V>(params: Option<&[(K, V)]>) -> Option<Params>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    params.map(|list| {
        list.iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect()
    })
}

/// One leaf of the flattened structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescriptor {
    /// Section path such as `2` or `2.1`
    pub path: String,
    /// Encoded size in octets, `None` if unknown
    pub bytes: Option<u64>,
    pub encoding: TransferEncoding,
    /// Declared `type/subtype`, lowercased
    pub mime_type: String,
    /// Decoded filename, `None` if the part is not a named attachment
    pub filename: Option<String>,
}

impl PartDescriptor {
    fn from_node(node: &StructureNode, path: String) -> Self {
        Self {
            path,
            bytes: node.bytes,
            encoding: node.encoding.clone(),
            mime_type: node.mime_type.clone(),
            filename: resolve_filename(node),
        }
    }
}

/// Flatten the structure into part descriptors, in section order
///
/// A childless root is the single part `1`. A child that has children of
/// its own (an embedded message) is replaced by those children as `i.j`.
/// Nothing deeper than that is visited.
pub fn flatten(root: &StructureNode) -> Vec<PartDescriptor> {
    if root.parts.is_empty() {
        return vec![PartDescriptor::from_node(root, "1".to_owned())];
    }

    let mut out = Vec::with_capacity(root.parts.len());
    for (idx, child) in root.parts.iter().enumerate() {
        let i = idx + 1;
        if child.parts.is_empty() {
            out.push(PartDescriptor::from_node(child, i.to_string()));
            continue;
        }
        for (sub_idx, grandchild) in child.parts.iter().enumerate() {
            out.push(PartDescriptor::from_node(
                grandchild,
                format!("{i}.{}", sub_idx + 1),
            ));
        }
    }
    out
}

/// Look up a parameter value by case-insensitive name
///
/// Servers and parsers may list the same attribute more than once with the
/// earlier entries truncated, so the last match wins.
pub fn resolve_attribute<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .rev()
        .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Resolve the display filename of a part
///
/// Prefers the disposition `filename` parameter and falls back to the
/// content-type `name` parameter. Empty values count as absent.
pub fn resolve_filename(node: &StructureNode) -> Option<String> {
    let from_disposition = node
        .disposition_parameters
        .as_deref()
        .and_then(|params| resolve_attribute(params, "filename"))
        .filter(|v| !v.is_empty());

    let raw = match from_disposition {
        Some(v) => Some(v),
        None => node
            .parameters
            .as_deref()
            .and_then(|params| resolve_attribute(params, "name"))
            .filter(|v| !v.is_empty()),
    }?;

    Some(mime::decode_words(raw))
}

/// Result of scanning a message structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Number of parts carrying a filename
    pub count: usize,
    /// First such part in section order
    pub candidate: Option<PartDescriptor>,
}

/// Count filename-bearing parts and keep the first
pub fn scan(root: &StructureNode) -> ScanResult {
    let mut count = 0;
    let mut candidate = None;
    for part in flatten(root) {
        if part.filename.is_none() {
            continue;
        }
        count += 1;
        if candidate.is_none() {
            candidate = Some(part);
        }
    }
    ScanResult { count, candidate }
}

#[cfg(test)]
pub(crate) mod tests {
    use imap_proto::parser::parse_response;
    use imap_proto::types::{AttributeValue, Response};

    use super::{
        Params, StructureNode, TransferEncoding, flatten, resolve_attribute, resolve_filename,
        scan,
    };

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    /// Single part of the given type without any filename
    pub(crate) fn leaf(mime_type: &str, bytes: u64) -> StructureNode {
        StructureNode {
            mime_type: mime_type.to_owned(),
            encoding: TransferEncoding::SevenBit,
            bytes: Some(bytes),
            parameters: None,
            disposition_parameters: None,
            parts: Vec::new(),
        }
    }

    /// Base64 part named through its disposition `filename`
    pub(crate) fn attached(filename: &str, mime_type: &str, bytes: u64) -> StructureNode {
        StructureNode {
            encoding: TransferEncoding::Base64,
            disposition_parameters: Some(params(&[("filename", filename)])),
            ..leaf(mime_type, bytes)
        }
    }

    pub(crate) fn multipart(subtype: &str, parts: Vec<StructureNode>) -> StructureNode {
        StructureNode {
            mime_type: format!("multipart/{subtype}"),
            encoding: TransferEncoding::SevenBit,
            bytes: None,
            parameters: Some(params(&[("boundary", "b1")])),
            disposition_parameters: None,
            parts,
        }
    }

    fn embedded(parts: Vec<StructureNode>) -> StructureNode {
        StructureNode {
            parts,
            ..leaf("message/rfc822", 4000)
        }
    }

    fn labels(root: &StructureNode) -> Vec<String> {
        flatten(root).into_iter().map(|p| p.path).collect()
    }

    #[test]
    fn childless_root_is_part_one() {
        let root = leaf("text/plain", 10);
        assert_eq!(labels(&root), vec!["1"]);
    }

    #[test]
    fn flat_children_are_numbered_in_order() {
        let root = multipart(
            "mixed",
            vec![
                leaf("text/plain", 1),
                leaf("text/html", 2),
                leaf("image/png", 3),
            ],
        );
        assert_eq!(labels(&root), vec!["1", "2", "3"]);
    }

    #[test]
    fn embedded_message_expands_one_level_and_keeps_siblings() {
        let root = multipart(
            "mixed",
            vec![
                leaf("text/plain", 1),
                embedded(vec![leaf("text/plain", 2), leaf("text/xml", 3), leaf("a/b", 4)]),
                leaf("image/png", 5),
            ],
        );
        assert_eq!(labels(&root), vec!["1", "2.1", "2.2", "2.3", "3"]);
    }

    #[test]
    fn nesting_below_two_levels_is_not_visited() {
        let deep = embedded(vec![multipart(
            "mixed",
            vec![attached("hidden.zip", "application/zip", 500)],
        )]);
        let root = multipart("mixed", vec![leaf("text/plain", 1), deep]);

        let parts = flatten(&root);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].path, "2.1");
        assert_eq!(parts[1].mime_type, "multipart/mixed");
        assert_eq!(scan(&root).count, 0);
    }

    #[test]
    fn last_matching_attribute_wins() {
        let list = params(&[("filename", "a"), ("filename", "abcdef")]);
        assert_eq!(resolve_attribute(&list, "filename"), Some("abcdef"));

        let mixed = params(&[
            ("FileName", "trunc"),
            ("size", "100"),
            ("filename", "report.xml.gz"),
            ("creation-date", "x"),
        ]);
        assert_eq!(resolve_attribute(&mixed, "filename"), Some("report.xml.gz"));

        let unique_last = params(&[("filename", "a"), ("filename", "abcdef"), ("name", "n")]);
        assert_eq!(resolve_attribute(&unique_last, "filename"), Some("abcdef"));
        assert_eq!(resolve_attribute(&unique_last, "NAME"), Some("n"));
        assert_eq!(resolve_attribute(&unique_last, "charset"), None);
    }

    #[test]
    fn filename_falls_back_to_content_type_name() {
        let node = StructureNode {
            parameters: Some(params(&[("name", "report.xml")])),
            disposition_parameters: Some(params(&[("filename", "")])),
            ..leaf("text/xml", 200)
        };
        assert_eq!(resolve_filename(&node).as_deref(), Some("report.xml"));
    }

    #[test]
    fn disposition_filename_takes_precedence() {
        let node = StructureNode {
            parameters: Some(params(&[("name", "ct-name.zip")])),
            disposition_parameters: Some(params(&[("filename", "disp-name.zip")])),
            ..leaf("application/zip", 200)
        };
        assert_eq!(resolve_filename(&node).as_deref(), Some("disp-name.zip"));
    }

    #[test]
    fn empty_or_missing_names_are_not_attachments() {
        let node = StructureNode {
            parameters: Some(params(&[("charset", "utf-8"), ("name", "")])),
            ..leaf("text/plain", 200)
        };
        assert_eq!(resolve_filename(&node), None);
        assert_eq!(resolve_filename(&leaf("text/plain", 1)), None);
    }

    #[test]
    fn encoded_word_filenames_are_decoded() {
        let node = attached(
            "=?UTF-8?B?cmFwcG9ydC3DqXTDqS54bWw=?=",
            "text/xml",
            300,
        );
        assert_eq!(resolve_filename(&node).as_deref(), Some("rapport-été.xml"));
    }

    #[test]
    fn scan_counts_all_and_keeps_first() {
        let root = multipart(
            "mixed",
            vec![
                leaf("text/plain", 10),
                attached("first.zip", "application/zip", 600),
                attached("second.zip", "application/zip", 700),
            ],
        );
        let result = scan(&root);
        assert_eq!(result.count, 2);
        let candidate = result.candidate.expect("candidate");
        assert_eq!(candidate.path, "2");
        assert_eq!(candidate.filename.as_deref(), Some("first.zip"));
        assert_eq!(candidate.bytes, Some(600));
        assert_eq!(candidate.encoding, TransferEncoding::Base64);
    }

    #[test]
    fn scan_finds_attachment_inside_embedded_message() {
        let root = multipart(
            "mixed",
            vec![embedded(vec![
                leaf("text/plain", 10),
                attached("google.com!example.com!1!2.zip", "application/zip", 900),
            ])],
        );
        let result = scan(&root);
        assert_eq!(result.count, 1);
        assert_eq!(result.candidate.expect("candidate").path, "1.2");
    }

    fn parse_structure(line: &[u8]) -> StructureNode {
        let (_, response) = parse_response(line).expect("valid response");
        let Response::Fetch(_, attrs) = response else {
            panic!("expected FETCH response");
        };
        let body = attrs
            .iter()
            .find_map(|attr| match attr {
                AttributeValue::BodyStructure(body) => Some(body),
                _ => None,
            })
            .expect("bodystructure attribute");
        StructureNode::from_body_structure(body)
    }

    #[test]
    fn normalizes_reported_bodystructure() {
        let line = b"* 1 FETCH (UID 7 BODYSTRUCTURE ((\"text\" \"plain\" (\"charset\" \"us-ascii\") NIL NIL \"7bit\" 12 1 NIL NIL NIL NIL)(\"application\" \"zip\" (\"name\" \"report.zip\") NIL NIL \"base64\" 700 NIL (\"attachment\" (\"filename\" \"rep\" \"filename\" \"report.zip\")) NIL NIL) \"mixed\" (\"boundary\" \"xyz\") NIL NIL NIL))\r\n";
        let root = parse_structure(line);
        assert_eq!(root.mime_type, "multipart/mixed");
        assert_eq!(root.bytes, None);
        assert_eq!(root.parts.len(), 2);

        let zip = &root.parts[1];
        assert_eq!(zip.mime_type, "application/zip");
        assert_eq!(zip.encoding, TransferEncoding::Base64);
        assert_eq!(zip.bytes, Some(700));

        let result = scan(&root);
        assert_eq!(result.count, 1);
        let candidate = result.candidate.expect("candidate");
        assert_eq!(candidate.path, "2");
        assert_eq!(candidate.filename.as_deref(), Some("report.zip"));
    }

    #[test]
    fn reported_embedded_multipart_message_uses_imap_sections() {
        let line = b"* 1 FETCH (UID 9 BODYSTRUCTURE ((\"message\" \"rfc822\" NIL NIL NIL \"7bit\" 2000 (\"Mon, 1 Jan 2024 00:00:00 +0000\" \"Report domain: example.com\" ((\"Reporter\" NIL \"noreply\" \"example.org\")) NIL NIL NIL NIL NIL NIL \"<r1@example.org>\") ((\"text\" \"plain\" (\"charset\" \"us-ascii\") NIL NIL \"7bit\" 20 2 NIL NIL NIL NIL)(\"application\" \"gzip\" (\"name\" \"r.xml.gz\") NIL NIL \"base64\" 640 NIL (\"attachment\" (\"filename\" \"r.xml.gz\")) NIL NIL) \"mixed\" (\"boundary\" \"inner\") NIL NIL NIL) 40 NIL NIL NIL NIL) \"mixed\" (\"boundary\" \"outer\") NIL NIL NIL))\r\n";
        let root = parse_structure(line);
        assert_eq!(root.parts.len(), 1);

        let message = &root.parts[0];
        assert_eq!(message.mime_type, "message/rfc822");
        assert_eq!(message.bytes, Some(2000));
        let child_types: Vec<&str> = message.parts.iter().map(|p| p.mime_type.as_str()).collect();
        assert_eq!(child_types, vec!["text/plain", "application/gzip"]);

        assert_eq!(labels(&root), vec!["1.1", "1.2"]);
        let result = scan(&root);
        assert_eq!(result.count, 1);
        let candidate = result.candidate.expect("candidate");
        assert_eq!(candidate.path, "1.2");
        assert_eq!(candidate.filename.as_deref(), Some("r.xml.gz"));
        assert_eq!(candidate.bytes, Some(640));
    }

    #[test]
    fn reported_embedded_single_body_message_is_its_only_child() {
        let line = b"* 1 FETCH (UID 9 BODYSTRUCTURE ((\"message\" \"rfc822\" NIL NIL NIL \"7bit\" 1200 (\"Mon, 1 Jan 2024 00:00:00 +0000\" \"Report domain: example.com\" ((\"Reporter\" NIL \"noreply\" \"example.org\")) NIL NIL NIL NIL NIL NIL \"<r2@example.org>\") (\"application\" \"gzip\" (\"name\" \"r.xml.gz\") NIL NIL \"base64\" 640 NIL (\"attachment\" (\"filename\" \"r.xml.gz\")) NIL NIL) 25 NIL NIL NIL NIL) \"mixed\" (\"boundary\" \"outer\") NIL NIL NIL))\r\n";
        let root = parse_structure(line);

        let message = &root.parts[0];
        assert_eq!(message.mime_type, "message/rfc822");
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.parts[0].mime_type, "application/gzip");

        let result = scan(&root);
        assert_eq!(result.count, 1);
        assert_eq!(result.candidate.expect("candidate").path, "1.1");
    }

    #[test]
    fn attachment_as_whole_message_is_part_one() {
        let root = attached("r.xml.gz", "application/gzip", 400);
        let result = scan(&root);
        assert_eq!(result.count, 1);
        let candidate = result.candidate.expect("candidate");
        assert_eq!(candidate.path, "1");
        assert_eq!(candidate.mime_type, "application/gzip");
    }
}
