// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Pure-Rust JPEG coefficient codec and payload carrier.
//!
//! Reads baseline JPEG files into quantized DCT coefficients, encodes RGBA
//! pixels into baseline JPEG, and writes coefficient grids back out with
//! optimised Huffman tables. Payload bits live in the low bit of a fixed set
//! of low-frequency AC coefficients (see [`slots`]).
//!
//! Supports:
//! - Baseline sequential DCT (SOF0/SOF1), 8-bit precision
//! - Any component count and sampling factors on read
//! - Restart markers (DRI/RST)
//! - Per-image optimal Huffman tables on write
//!
//! Does NOT support:
//! - Progressive, lossless or arithmetic-coded frames (rejected at parse time)
//! - 12-bit precision (rejected at parse time)

pub mod bitio;
pub mod dct;
pub mod error;
pub mod fdct;
pub mod frame;
pub mod huffman;
pub mod marker;
pub mod pack;
pub mod scan;
pub mod slots;
pub mod tables;
pub mod unpack;

use dct::{DctGrid, QuantTable};
use error::{JpegError, Result};
use frame::FrameInfo;
use marker::{iterate_markers, parse_dri, parse_sos, MarkerSegment};
use scan::ScanComponent;
use tables::{parse_dht, parse_dqt, HuffmanSpec};

use crate::bitfile::BitFile;

pub use fdct::DctMethod;
pub use pack::{default_quality_for_messaging, max_data_for_image, pack, repack};
pub use slots::{bits_per_coefficient, embedded_group_size};
pub use unpack::{hash_image_data, is_data_jpeg, is_scrambled, unpack, Carrier, MIN_IDENTIFICATION_LEN};

/// A baseline JPEG held as quantized DCT coefficients.
///
/// Header segments that the codec does not interpret (APPn, COM) are kept in
/// their original order; quantization, frame, Huffman and restart segments
/// are regenerated from state on every [`to_bytes`](Self::to_bytes).
#[derive(Clone)]
pub struct JpegImage {
    frame: FrameInfo,
    /// One grid per scan component, in scan order.
    grids: Vec<DctGrid>,
    quant_tables: [Option<QuantTable>; 4],
    scan_components: Vec<ScanComponent>,
    restart_interval: u16,
    /// Uninterpreted header segments, in file order.
    segments: Vec<MarkerSegment>,
}

impl JpegImage {
    /// Parse a baseline JPEG file.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (entries, scan_start) = iterate_markers(data)?;

        let mut frame: Option<FrameInfo> = None;
        let mut quant_tables: [Option<QuantTable>; 4] = Default::default();
        let mut dc_specs: [Option<HuffmanSpec>; 4] = Default::default();
        let mut ac_specs: [Option<HuffmanSpec>; 4] = Default::default();
        let mut restart_interval = 0u16;
        let mut segments = Vec::new();
        let mut selectors = None;

        for entry in entries {
            match entry.marker {
                marker::SOI | marker::EOI => {}
                0xD0..=0xD7 => {}
                marker::SOF0 | marker::SOF1 => frame = Some(frame::parse_sof(&entry.data)?),
                marker::DQT => {
                    for (id, qt) in parse_dqt(&entry.data)? {
                        quant_tables[id as usize] = Some(qt);
                    }
                }
                marker::DHT => {
                    for spec in parse_dht(&entry.data)? {
                        let id = spec.id as usize;
                        if spec.class == 0 {
                            dc_specs[id] = Some(spec);
                        } else {
                            ac_specs[id] = Some(spec);
                        }
                    }
                }
                marker::DRI => restart_interval = parse_dri(&entry.data)?,
                marker::SOS => selectors = Some(parse_sos(&entry.data)?),
                other => segments.push(MarkerSegment { marker: other, data: entry.data }),
            }
        }

        let frame = frame.ok_or(JpegError::InvalidMarkerData("missing SOF"))?;
        let selectors = selectors.ok_or(JpegError::InvalidMarkerData("missing SOS"))?;
        if selectors.len() != frame.components.len() {
            return Err(JpegError::InvalidMarkerData("multi-scan baseline files are not supported"));
        }

        let mut scan_components = Vec::with_capacity(selectors.len());
        for (comp_id, dc, ac) in selectors {
            let comp_idx = frame
                .components
                .iter()
                .position(|c| c.id == comp_id)
                .ok_or(JpegError::UnknownComponentId(comp_id))?;
            if dc > 3 || ac > 3 {
                return Err(JpegError::InvalidHuffmanTableId(dc.max(ac)));
            }
            let qt_id = frame.components[comp_idx].quant_table_id;
            if quant_tables[qt_id as usize].is_none() {
                return Err(JpegError::InvalidQuantTableId(qt_id));
            }
            scan_components.push(ScanComponent { comp_idx, dc_table: dc as usize, ac_table: ac as usize });
        }

        let (grids, _) = scan::decode_scan(
            data,
            scan_start,
            &frame,
            &scan_components,
            &dc_specs,
            &ac_specs,
            restart_interval,
        )?;

        Ok(Self { frame, grids, quant_tables, scan_components, restart_interval, segments })
    }

    /// Assemble an image from freshly computed coefficients. Every frame
    /// component forms one scan component, in frame order; components using
    /// quantization table 0 share Huffman tables 0, all others tables 1.
    pub fn from_parts(
        frame: FrameInfo,
        quant_tables: [Option<QuantTable>; 4],
        grids: Vec<DctGrid>,
        segments: Vec<MarkerSegment>,
    ) -> Result<Self> {
        if grids.len() != frame.components.len() {
            return Err(JpegError::InvalidDimensions);
        }
        let mut scan_components = Vec::with_capacity(grids.len());
        for (idx, (comp, grid)) in frame.components.iter().zip(&grids).enumerate() {
            if grid.blocks_wide() != frame.blocks_wide(idx) || grid.blocks_tall() != frame.blocks_tall(idx) {
                return Err(JpegError::InvalidDimensions);
            }
            if quant_tables[comp.quant_table_id as usize].is_none() {
                return Err(JpegError::InvalidQuantTableId(comp.quant_table_id));
            }
            let table = usize::from(comp.quant_table_id != 0);
            scan_components.push(ScanComponent { comp_idx: idx, dc_table: table, ac_table: table });
        }
        Ok(Self { frame, grids, quant_tables, scan_components, restart_interval: 0, segments })
    }

    /// Encode as baseline JPEG with Huffman tables optimised for the current
    /// coefficients.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        let (dc_freq, ac_freq) =
            scan::count_symbols(&self.frame, &self.scan_components, &self.grids, self.restart_interval)?;
        let mut dc_specs: [Option<HuffmanSpec>; 4] = Default::default();
        let mut ac_specs: [Option<HuffmanSpec>; 4] = Default::default();
        for id in 0..4 {
            if !dc_freq[id].is_empty() {
                dc_specs[id] = Some(huffman::build_huffman_spec(0, id as u8, &dc_freq[id]));
            }
            if !ac_freq[id].is_empty() {
                ac_specs[id] = Some(huffman::build_huffman_spec(1, id as u8, &ac_freq[id]));
            }
        }

        let mut out = BitFile::for_write();
        out.write_marker(0xFF00 | marker::SOI as u16)?;
        for seg in &self.segments {
            out.begin_marker_segment(0xFF00 | seg.marker as u16)?;
            out.write(&seg.data)?;
            out.commit_marker_segment()?;
        }
        for (id, qt) in self.quant_tables.iter().enumerate() {
            if let Some(qt) = qt {
                tables::write_dqt(&mut out, id as u8, qt)?;
            }
        }
        out.begin_marker_segment(0xFF00 | marker::SOF0 as u16)?;
        out.write(&self.frame.to_sof_body())?;
        out.commit_marker_segment()?;
        for spec in dc_specs.iter().chain(&ac_specs).flatten() {
            tables::write_dht(&mut out, spec)?;
        }
        if self.restart_interval > 0 {
            out.begin_marker_segment(0xFF00 | marker::DRI as u16)?;
            out.put_u16(self.restart_interval)?;
            out.commit_marker_segment()?;
        }

        out.begin_marker_segment(0xFF00 | marker::SOS as u16)?;
        out.put_u8(self.scan_components.len() as u8)?;
        for sc in &self.scan_components {
            out.put_u8(self.frame.components[sc.comp_idx].id)?;
            out.put_u8(((sc.dc_table as u8) << 4) | sc.ac_table as u8)?;
        }
        out.write(&[0, 63, 0])?;
        out.commit_marker_segment()?;

        scan::encode_scan(
            &mut out,
            &self.frame,
            &self.scan_components,
            &self.grids,
            &dc_specs,
            &ac_specs,
            self.restart_interval,
        )?;
        out.write_marker(0xFF00 | marker::EOI as u16)?;
        out.into_data()
    }

    pub fn frame_info(&self) -> &FrameInfo {
        &self.frame
    }

    pub fn num_components(&self) -> usize {
        self.grids.len()
    }

    /// Grid of a component in scan order (typically 0=Y, 1=Cb, 2=Cr).
    pub fn dct_grid(&self, component: usize) -> &DctGrid {
        &self.grids[component]
    }

    pub fn dct_grid_mut(&mut self, component: usize) -> &mut DctGrid {
        &mut self.grids[component]
    }

    pub fn grids(&self) -> &[DctGrid] {
        &self.grids
    }

    pub fn grids_mut(&mut self) -> &mut [DctGrid] {
        &mut self.grids
    }

    pub fn quant_table(&self, id: usize) -> Option<&QuantTable> {
        self.quant_tables.get(id).and_then(Option::as_ref)
    }

    pub fn restart_interval(&self) -> u16 {
        self.restart_interval
    }

    /// Emit RST markers every `interval` MCUs (0 disables them).
    pub fn set_restart_interval(&mut self, interval: u16) {
        self.restart_interval = interval;
    }

    /// Preserved APPn/COM segments.
    pub fn segments(&self) -> &[MarkerSegment] {
        &self.segments
    }

    /// First preserved segment with this marker whose body starts with `prefix`.
    pub fn find_segment(&self, marker: u8, prefix: &[u8]) -> Option<&MarkerSegment> {
        self.segments.iter().find(|s| s.marker == marker && s.data.starts_with(prefix))
    }

    pub fn remove_segments(&mut self, marker: u8, prefix: &[u8]) {
        self.segments.retain(|s| !(s.marker == marker && s.data.starts_with(prefix)));
    }

    /// Add a segment after the existing ones (after APP0, if present first).
    pub fn push_segment(&mut self, marker: u8, data: Vec<u8>) {
        self.segments.push(MarkerSegment { marker, data });
    }
}
