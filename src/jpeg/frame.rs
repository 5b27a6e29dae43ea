// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Frame header (SOF0): dimensions, components and sampling factors.

use super::error::{JpegError, Result};

/// One image component from SOF.
#[derive(Debug, Clone)]
pub struct Component {
    /// Typically 1=Y, 2=Cb, 3=Cr.
    pub id: u8,
    pub h_sampling: u8,
    pub v_sampling: u8,
    pub quant_table_id: u8,
}

#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub precision: u8,
    pub height: u16,
    pub width: u16,
    pub components: Vec<Component>,
    pub max_h_sampling: u8,
    pub max_v_sampling: u8,
    /// MCU size in pixels.
    pub mcu_width: u16,
    pub mcu_height: u16,
    pub mcus_wide: u16,
    pub mcus_tall: u16,
}

impl FrameInfo {
    /// Three-component YCbCr frame with 1×1 sampling everywhere. Luma uses
    /// quantization table 0, both chroma planes table 1.
    pub fn ycbcr_444(width: u16, height: u16) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(JpegError::InvalidDimensions);
        }
        let components = (1..=3u8)
            .map(|id| Component { id, h_sampling: 1, v_sampling: 1, quant_table_id: u8::from(id != 1) })
            .collect();
        Ok(Self::with_components(8, width, height, components, 1, 1))
    }

    fn with_components(
        precision: u8,
        width: u16,
        height: u16,
        components: Vec<Component>,
        max_h: u8,
        max_v: u8,
    ) -> Self {
        let mcu_width = (max_h as u16) * 8;
        let mcu_height = (max_v as u16) * 8;
        Self {
            precision,
            height,
            width,
            components,
            max_h_sampling: max_h,
            max_v_sampling: max_v,
            mcu_width,
            mcu_height,
            mcus_wide: width.div_ceil(mcu_width),
            mcus_tall: height.div_ceil(mcu_height),
        }
    }

    /// 8×8 blocks across for a component, MCU padding included.
    pub fn blocks_wide(&self, comp_idx: usize) -> usize {
        self.mcus_wide as usize * self.components[comp_idx].h_sampling as usize
    }

    pub fn blocks_tall(&self, comp_idx: usize) -> usize {
        self.mcus_tall as usize * self.components[comp_idx].v_sampling as usize
    }

    /// SOF0 body (without marker or length).
    pub fn to_sof_body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.components.len() * 3);
        out.push(self.precision);
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.width.to_be_bytes());
        out.push(self.components.len() as u8);
        for c in &self.components {
            out.push(c.id);
            out.push((c.h_sampling << 4) | c.v_sampling);
            out.push(c.quant_table_id);
        }
        out
    }
}

/// Parse a SOF0 segment body (after the length).
pub fn parse_sof(data: &[u8]) -> Result<FrameInfo> {
    if data.len() < 6 {
        return Err(JpegError::UnexpectedEof);
    }
    let precision = data[0];
    if precision != 8 {
        return Err(JpegError::UnsupportedPrecision(precision));
    }

    let height = u16::from_be_bytes([data[1], data[2]]);
    let width = u16::from_be_bytes([data[3], data[4]]);
    let num_components = data[5] as usize;
    // Height 0 (DNL-defined) is not handled.
    if width == 0 || height == 0 || num_components == 0 || num_components > 4 {
        return Err(JpegError::InvalidDimensions);
    }
    if data.len() < 6 + num_components * 3 {
        return Err(JpegError::UnexpectedEof);
    }

    let mut components = Vec::with_capacity(num_components);
    let (mut max_h, mut max_v) = (0u8, 0u8);
    for spec in data[6..6 + num_components * 3].chunks_exact(3) {
        let h_sampling = spec[1] >> 4;
        let v_sampling = spec[1] & 0x0F;
        let quant_table_id = spec[2];
        if !(1..=4).contains(&h_sampling) || !(1..=4).contains(&v_sampling) {
            return Err(JpegError::InvalidDimensions);
        }
        if quant_table_id > 3 {
            return Err(JpegError::InvalidQuantTableId(quant_table_id));
        }
        max_h = max_h.max(h_sampling);
        max_v = max_v.max(v_sampling);
        components.push(Component { id: spec[0], h_sampling, v_sampling, quant_table_id });
    }

    Ok(FrameInfo::with_components(precision, width, height, components, max_h, max_v))
}
