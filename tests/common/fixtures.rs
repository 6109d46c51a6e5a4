//! Test fixtures and PDF builders.
//!
//! Provides a builder that assembles small PDFs by hand, so tests control
//! the exact content-stream operators, compression and cross-reference
//! layout of the document under test.

#![allow(dead_code)]

use anyhow::Result;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// The content stream used throughout the end-to-end tests.
pub const HELLO_CONTENT: &str = "BT /F1 12 Tf 100 700 Td (Hello Secret World) Tj ET";

/// Two lines set at 14pt leading, one sensitive and one not.
pub const TWO_LINE_CONTENT: &str =
    "BT /F1 12 Tf 100 700 Td (Secret code) Tj 0 -14 Td (Public info) Tj ET";

/// One page of a [`TestPdfBuilder`] document.
#[derive(Debug, Clone)]
pub struct TestPage {
    content: String,
    forms: Vec<(String, String)>,
    image: bool,
}

/// Builder for creating test PDFs with custom content.
///
/// # Example
///
/// ```ignore
/// let pdf = TestPdfBuilder::new()
///     .page("BT /F1 12 Tf 72 720 Td (Secret) Tj ET")
///     .compressed()
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct TestPdfBuilder {
    pages: Vec<TestPage>,
    compress: bool,
    object_streams: bool,
    encrypted: bool,
}

struct RawObject {
    number: u32,
    dict: String,
    stream: Option<Vec<u8>>,
}

impl TestPdfBuilder {
    /// Creates a new builder with no pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a page drawing `content`.
    pub fn page(mut self, content: &str) -> Self {
        self.pages.push(TestPage {
            content: content.to_string(),
            forms: Vec::new(),
            image: false,
        });
        self
    }

    /// Adds a page whose content invokes the form `name` drawing
    /// `form_content`.
    pub fn page_with_form(mut self, content: &str, name: &str, form_content: &str) -> Self {
        self.pages.push(TestPage {
            content: content.to_string(),
            forms: vec![(name.to_string(), form_content.to_string())],
            image: false,
        });
        self
    }

    /// Adds a page that only paints a 1x1 image XObject named `/Im1`.
    pub fn image_page(mut self) -> Self {
        self.pages.push(TestPage {
            content: "q 200 0 0 200 100 400 cm /Im1 Do Q".to_string(),
            forms: Vec::new(),
            image: true,
        });
        self
    }

    /// Flate-compresses every stream.
    pub fn compressed(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Packs non-stream objects into an object stream and indexes the file
    /// with a cross-reference stream.
    pub fn object_streams(mut self) -> Self {
        self.object_streams = true;
        self
    }

    /// Declares an `/Encrypt` dictionary in the trailer.
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    fn objects(&self) -> Vec<RawObject> {
        let mut objects = Vec::new();
        let mut next = 4;
        let mut kids = Vec::new();
        for page in &self.pages {
            let page_num = next;
            let content_num = next + 1;
            next += 2;
            kids.push(format!("{page_num} 0 R"));

            let mut xobjects = String::new();
            for (name, form_content) in &page.forms {
                let _ = write!(xobjects, "/{name} {next} 0 R ");
                objects.push(RawObject {
                    number: next,
                    dict: "/Type /XObject /Subtype /Form /BBox [0 0 612 792] /Resources << /Font << /F1 3 0 R >> >>"
                        .to_string(),
                    stream: Some(form_content.as_bytes().to_vec()),
                });
                next += 1;
            }
            if page.image {
                let _ = write!(xobjects, "/Im1 {next} 0 R ");
                objects.push(RawObject {
                    number: next,
                    dict: "/Type /XObject /Subtype /Image /Width 1 /Height 1 /ColorSpace /DeviceGray /BitsPerComponent 8"
                        .to_string(),
                    stream: Some(vec![0x80]),
                });
                next += 1;
            }
            let xobject_entry = if xobjects.is_empty() {
                String::new()
            } else {
                format!(" /XObject << {}>>", xobjects)
            };
            objects.push(RawObject {
                number: page_num,
                dict: format!(
                    "/Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 3 0 R >>{xobject_entry} >> /Contents {content_num} 0 R"
                ),
                stream: None,
            });
            objects.push(RawObject {
                number: content_num,
                dict: String::new(),
                stream: Some(page.content.as_bytes().to_vec()),
            });
        }
        objects.push(RawObject {
            number: 1,
            dict: "/Type /Catalog /Pages 2 0 R".to_string(),
            stream: None,
        });
        objects.push(RawObject {
            number: 2,
            dict: format!(
                "/Type /Pages /Kids [{}] /Count {}",
                kids.join(" "),
                self.pages.len()
            ),
            stream: None,
        });
        objects.push(RawObject {
            number: 3,
            dict: "/Type /Font /Subtype /Type1 /BaseFont /Helvetica".to_string(),
            stream: None,
        });
        objects.sort_by_key(|o| o.number);
        objects
    }

    fn stream_parts(&self, dict: &str, data: &[u8]) -> (String, Vec<u8>) {
        let prefix = if dict.is_empty() {
            String::new()
        } else {
            format!("{dict} ")
        };
        if self.compress {
            let data = zlib(data);
            (
                format!("<< {prefix}/Length {} /Filter /FlateDecode >>", data.len()),
                data,
            )
        } else {
            (format!("<< {prefix}/Length {} >>", data.len()), data.to_vec())
        }
    }

    fn encrypt_entry(&self) -> &'static str {
        if self.encrypted {
            " /Encrypt << /Filter /Standard /V 2 /R 3 /Length 128 >>"
        } else {
            ""
        }
    }

    /// Assembles the document.
    pub fn build(&self) -> Vec<u8> {
        if self.object_streams {
            self.build_with_object_streams()
        } else {
            self.build_classic()
        }
    }

    fn build_classic(&self) -> Vec<u8> {
        let objects = self.objects();
        let mut out = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let mut offsets = Vec::new();
        for object in &objects {
            offsets.push(out.len());
            write_object(&mut out, object.number, &self.object_body(object));
        }
        let size = objects.len() + 1;
        let xref_offset = out.len();
        let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for offset in offsets {
            let _ = writeln!(xref, "{offset:010} 00000 n ");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {size} /Root 1 0 R{} >>\nstartxref\n{xref_offset}\n%%EOF\n",
            self.encrypt_entry()
        );
        out.extend_from_slice(xref.as_bytes());
        out
    }

    fn object_body(&self, object: &RawObject) -> Vec<u8> {
        match &object.stream {
            Some(data) => {
                let (dict, data) = self.stream_parts(&object.dict, data);
                let mut body = format!("{dict}\nstream\n").into_bytes();
                body.extend_from_slice(&data);
                body.extend_from_slice(b"\nendstream");
                body
            }
            None => format!("<< {} >>", object.dict).into_bytes(),
        }
    }

    fn build_with_object_streams(&self) -> Vec<u8> {
        let objects = self.objects();
        let container = objects.len() as u32 + 1;
        let xref_num = container + 1;
        let size = xref_num as usize + 1;

        let mut header = String::new();
        let mut payload = String::new();
        let mut packed = Vec::new();
        for object in objects.iter().filter(|o| o.stream.is_none()) {
            let _ = write!(header, "{} {} ", object.number, payload.len());
            payload.push_str(&format!("<< {} >>\n", object.dict));
            packed.push(object.number);
        }
        let first = header.len();
        let container_data = format!("{header}{payload}").into_bytes();

        let mut out = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let mut entries = vec![(0u8, 0u32, 0xffffu16); size];
        for object in objects.iter().filter(|o| o.stream.is_some()) {
            entries[object.number as usize] = (1, out.len() as u32, 0);
            write_object(&mut out, object.number, &self.object_body(object));
        }
        for (index, number) in packed.iter().enumerate() {
            entries[*number as usize] = (2, container, index as u16);
        }
        entries[container as usize] = (1, out.len() as u32, 0);
        let compressed = zlib(&container_data);
        let mut body = format!(
            "<< /Type /ObjStm /N {} /First {first} /Length {} /Filter /FlateDecode >>\nstream\n",
            packed.len(),
            compressed.len()
        )
        .into_bytes();
        body.extend_from_slice(&compressed);
        body.extend_from_slice(b"\nendstream");
        write_object(&mut out, container, &body);

        let xref_offset = out.len();
        entries[xref_num as usize] = (1, xref_offset as u32, 0);
        let mut rows = Vec::with_capacity(size * 7);
        for (kind, field, generation) in entries {
            rows.push(kind);
            rows.extend_from_slice(&field.to_be_bytes());
            rows.extend_from_slice(&generation.to_be_bytes());
        }
        let rows = zlib(&rows);
        let mut body = format!(
            "<< /Type /XRef /Size {size} /W [1 4 2] /Root 1 0 R{} /Length {} /Filter /FlateDecode >>\nstream\n",
            self.encrypt_entry(),
            rows.len()
        )
        .into_bytes();
        body.extend_from_slice(&rows);
        body.extend_from_slice(b"\nendstream");
        write_object(&mut out, xref_num, &body);
        out.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());
        out
    }

    /// Builds the document and writes it to `dir/name`.
    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        std::fs::write(&path, self.build())?;
        Ok(path)
    }
}

fn write_object(out: &mut Vec<u8>, number: u32, body: &[u8]) {
    out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(b"\nendobj\n");
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory write");
    encoder.finish().expect("in-memory finish")
}

/// Replaces every occurrence of `from` in `bytes` with `to`.
pub fn replace_bytes(bytes: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if !from.is_empty() && bytes[i..].starts_with(from) {
            out.extend_from_slice(to);
            i += from.len();
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

/// One page showing [`HELLO_CONTENT`].
pub fn hello_pdf() -> Vec<u8> {
    TestPdfBuilder::new().page(HELLO_CONTENT).build()
}
