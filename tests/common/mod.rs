//! Synthetic PDF fixtures with real byte offsets.

#![allow(dead_code)]

use std::collections::BTreeMap;

/// Location of an object in a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Offset { generation: u16, offset: usize },
    Compressed { stream_id: u32, index: usize },
    Free { next: u32, generation: u16 },
}

/// Appends objects to a buffer and records where each one starts.
pub struct PdfBuilder {
    data: Vec<u8>,
    slots: BTreeMap<u32, Slot>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::with_header(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n")
    }

    pub fn with_header(header: &[u8]) -> Self {
        Self {
            data: header.to_vec(),
            slots: BTreeMap::new(),
        }
    }

    /// Continue an existing file; slots start empty so only the update's
    /// objects appear in the next section.
    pub fn append_to(data: Vec<u8>) -> Self {
        Self {
            data,
            slots: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn offset_of(&self, id: u32) -> Option<usize> {
        match self.slots.get(&id) {
            Some(Slot::Offset { offset, .. }) => Some(*offset),
            _ => None,
        }
    }

    pub fn object(&mut self, id: u32, body: &str) -> &mut Self {
        self.object_with_generation(id, 0, body.as_bytes())
    }

    pub fn object_with_generation(&mut self, id: u32, generation: u16, body: &[u8]) -> &mut Self {
        let offset = self.data.len();
        self.data.extend_from_slice(format!("{} {} obj\n", id, generation).as_bytes());
        self.data.extend_from_slice(body);
        self.data.extend_from_slice(b"\nendobj\n");
        self.slots.insert(id, Slot::Offset { generation, offset });
        self
    }

    /// Stream object; `dict_entries` go inside the dictionary next to `/Length`.
    pub fn stream(&mut self, id: u32, dict_entries: &str, payload: &[u8]) -> &mut Self {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict_entries, payload.len()).into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\nendstream");
        self.object_with_generation(id, 0, &body)
    }

    /// Object stream `id` holding `objects`, uncompressed.
    pub fn object_stream(&mut self, id: u32, objects: &[(u32, &str)]) -> &mut Self {
        let mut header = String::new();
        let mut body = String::new();
        for (index, (obj_id, value)) in objects.iter().enumerate() {
            header.push_str(&format!("{} {} ", obj_id, body.len()));
            body.push_str(value);
            body.push('\n');
            self.slots.insert(*obj_id, Slot::Compressed { stream_id: id, index });
        }
        let first = header.len();
        let payload = format!("{}{}", header, body);
        self.stream(
            id,
            &format!("/Type /ObjStm /N {} /First {}", objects.len(), first),
            payload.as_bytes(),
        )
    }

    pub fn free(&mut self, id: u32, next: u32, generation: u16) -> &mut Self {
        self.slots.insert(id, Slot::Free { next, generation });
        self
    }

    fn size(&self) -> u32 {
        self.slots.keys().next_back().map_or(1, |id| id + 1)
    }

    fn table_rows(&self, full: bool) -> String {
        let mut rows = String::from("xref\n");
        if full {
            let size = self.size();
            rows.push_str(&format!("0 {}\n", size));
            for id in 0..size {
                rows.push_str(&self.table_row(id));
            }
        } else {
            for (id, _) in &self.slots {
                rows.push_str(&format!("{} 1\n", id));
                rows.push_str(&self.table_row(*id));
            }
        }
        rows
    }

    fn table_row(&self, id: u32) -> String {
        match self.slots.get(&id) {
            Some(Slot::Offset { generation, offset }) => format!("{:010} {:05} n \n", offset, generation),
            Some(Slot::Free { next, generation }) => format!("{:010} {:05} f \n", next, generation),
            Some(Slot::Compressed { .. }) => panic!("compressed object {} needs an xref stream", id),
            None if id == 0 => "0000000000 65535 f \n".to_string(),
            None => "0000000000 00000 f \n".to_string(),
        }
    }

    /// Classic table covering `0..size`, then trailer and `startxref`.
    pub fn finish_table(mut self, trailer_entries: &str) -> Vec<u8> {
        let xref = self.data.len();
        let rows = self.table_rows(true);
        let size = self.size();
        self.data.extend_from_slice(rows.as_bytes());
        self.data.extend_from_slice(
            format!(
                "trailer\n<< /Size {} {} >>\nstartxref\n{}\n%%EOF\n",
                size, trailer_entries, xref
            )
            .as_bytes(),
        );
        self.data
    }

    /// Update section listing only this builder's objects, chained to `prev`.
    pub fn finish_update_table(mut self, size: u32, prev: usize, trailer_entries: &str) -> Vec<u8> {
        let xref = self.data.len();
        let rows = self.table_rows(false);
        self.data.extend_from_slice(rows.as_bytes());
        self.data.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Prev {} {} >>\nstartxref\n{}\n%%EOF\n",
                size, prev, trailer_entries, xref
            )
            .as_bytes(),
        );
        self.data
    }

    /// Uncompressed cross-reference stream `stream_id` covering `0..size`,
    /// `/W [1 4 2]`.
    pub fn finish_xref_stream(mut self, stream_id: u32, trailer_entries: &str) -> Vec<u8> {
        let xref = self.data.len();
        self.slots.insert(
            stream_id,
            Slot::Offset {
                generation: 0,
                offset: xref,
            },
        );
        let size = self.size();
        let mut rows = Vec::new();
        for id in 0..size {
            let (kind, field2, field3): (u8, u32, u16) = match self.slots.get(&id) {
                Some(Slot::Offset { generation, offset }) => (1, *offset as u32, *generation),
                Some(Slot::Compressed { stream_id, index }) => (2, *stream_id, *index as u16),
                Some(Slot::Free { next, generation }) => (0, *next, *generation),
                None if id == 0 => (0, 0, 65535),
                None => (0, 0, 0),
            };
            rows.push(kind);
            rows.extend_from_slice(&field2.to_be_bytes());
            rows.extend_from_slice(&field3.to_be_bytes());
        }
        let mut body = format!(
            "<< /Type /XRef /Size {} /W [1 4 2] {} /Length {} >>\nstream\n",
            size,
            trailer_entries,
            rows.len()
        )
        .into_bytes();
        body.extend_from_slice(&rows);
        body.extend_from_slice(b"\nendstream");
        self.data.extend_from_slice(format!("{} 0 obj\n", stream_id).as_bytes());
        self.data.extend_from_slice(&body);
        self.data.extend_from_slice(b"\nendobj\n");
        self.data
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref).as_bytes());
        self.data
    }
}

/// One page with a square annotation (`/NM (square-1)`) and a text note.
///
/// Objects: 1 catalog, 2 pages, 3 page, 4 square, 5 text, 6 content stream.
pub fn annotated_document() -> Vec<u8> {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 6 0 R /Annots [4 0 R 5 0 R] >>",
        )
        .object(
            4,
            "<< /Type /Annot /Subtype /Square /Rect [100 100 200 150] /NM (square-1) /C [1 0 0] /P 3 0 R \
             /M (D:20240105093000Z) >>",
        )
        .object(
            5,
            "<< /Type /Annot /Subtype /Text /Rect [300 700 320 720] /NM (note-1) /Contents (Check this) \
             /T (Reviewer) /Name /Comment >>",
        )
        .stream(6, "", b"0 0 1 rg 10 10 100 100 re f");
    b.finish_table("/Root 1 0 R")
}

/// Two pages under a nested page tree, no annotations.
pub fn two_page_document() -> Vec<u8> {
    let mut b = PdfBuilder::new();
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>")
        .object(4, "<< /Type /Pages /Parent 2 0 R /Kids [5 0 R] /Count 1 >>")
        .object(5, "<< /Type /Page /Parent 4 0 R /MediaBox [0 0 595 842] /Rotate 90 >>");
    b.finish_table("/Root 1 0 R")
}
