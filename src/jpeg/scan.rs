// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Baseline scan decoding and encoding.
//!
//! Decodes entropy-coded data into one [`DctGrid`] per scan component and
//! encodes grids back into a [`BitFile`] entropy segment. Symbol statistics
//! for optimal Huffman tables come from the same block walk the encoder
//! uses, so the two can never disagree on which symbols appear.

use super::bitio::BitReader;
use super::dct::DctGrid;
use super::error::{JpegError, Result};
use super::frame::FrameInfo;
use super::huffman::{encode_value, extend_sign, HuffmanDecodeTable, HuffmanEncodeTable};
use super::tables::{HuffmanSpec, NATURAL_TO_ZIGZAG, ZIGZAG_TO_NATURAL};
use crate::bitfile::BitFile;

/// One component of a scan.
#[derive(Debug, Clone)]
pub struct ScanComponent {
    /// Index into `FrameInfo::components`.
    pub comp_idx: usize,
    pub dc_table: usize,
    pub ac_table: usize,
}

/// Visit every block in MCU order. `f(scan_idx, block_row, block_col,
/// restart)`; `restart` is true on the first block after a restart boundary.
fn walk_mcus<E, F>(
    frame: &FrameInfo,
    scan_components: &[ScanComponent],
    restart_interval: u16,
    mut f: F,
) -> std::result::Result<(), E>
where
    F: FnMut(usize, usize, usize, bool) -> std::result::Result<(), E>,
{
    let mut mcu_count = 0usize;
    for mcu_row in 0..frame.mcus_tall as usize {
        for mcu_col in 0..frame.mcus_wide as usize {
            let mut restart =
                restart_interval > 0 && mcu_count > 0 && mcu_count % restart_interval as usize == 0;
            for (sci, sc) in scan_components.iter().enumerate() {
                let comp = &frame.components[sc.comp_idx];
                for v in 0..comp.v_sampling as usize {
                    for h in 0..comp.h_sampling as usize {
                        let br = mcu_row * comp.v_sampling as usize + v;
                        let bc = mcu_col * comp.h_sampling as usize + h;
                        f(sci, br, bc, restart)?;
                        restart = false;
                    }
                }
            }
            mcu_count += 1;
        }
    }
    Ok(())
}

/// Decode the scan starting at `scan_start`. Returns the grids and the
/// offset just past the consumed entropy data.
pub fn decode_scan(
    data: &[u8],
    scan_start: usize,
    frame: &FrameInfo,
    scan_components: &[ScanComponent],
    dc_specs: &[Option<HuffmanSpec>; 4],
    ac_specs: &[Option<HuffmanSpec>; 4],
    restart_interval: u16,
) -> Result<(Vec<DctGrid>, usize)> {
    let mut dc_tables: [Option<HuffmanDecodeTable>; 4] = Default::default();
    let mut ac_tables: [Option<HuffmanDecodeTable>; 4] = Default::default();
    for sc in scan_components {
        if dc_tables[sc.dc_table].is_none() {
            let spec = dc_specs[sc.dc_table]
                .as_ref()
                .ok_or(JpegError::InvalidHuffmanTableId(sc.dc_table as u8))?;
            dc_tables[sc.dc_table] = Some(HuffmanDecodeTable::build(spec)?);
        }
        if ac_tables[sc.ac_table].is_none() {
            let spec = ac_specs[sc.ac_table]
                .as_ref()
                .ok_or(JpegError::InvalidHuffmanTableId(sc.ac_table as u8))?;
            ac_tables[sc.ac_table] = Some(HuffmanDecodeTable::build(spec)?);
        }
    }

    let mut grids: Vec<DctGrid> = scan_components
        .iter()
        .map(|sc| DctGrid::new(frame.blocks_wide(sc.comp_idx), frame.blocks_tall(sc.comp_idx)))
        .collect();
    // i32 so corrupt streams cannot overflow the running sum.
    let mut dc_pred = vec![0i32; scan_components.len()];
    let mut reader = BitReader::new(data, scan_start);

    walk_mcus(frame, scan_components, restart_interval, |sci, br, bc, restart| {
        if restart {
            // Any RSTn is accepted, as libjpeg does.
            reader.check_restart_marker()?;
            dc_pred.iter_mut().for_each(|p| *p = 0);
        }
        let sc = &scan_components[sci];
        let dc_tab = dc_tables[sc.dc_table].as_ref().ok_or(JpegError::HuffmanDecode)?;
        let ac_tab = ac_tables[sc.ac_table].as_ref().ok_or(JpegError::HuffmanDecode)?;

        let mut zz = [0i16; 64];
        let dc_size = dc_tab.decode(&mut reader)?;
        if dc_size > 11 {
            return Err(JpegError::HuffmanDecode);
        }
        if dc_size > 0 {
            let bits = reader.read_bits(dc_size)?;
            dc_pred[sci] += extend_sign(bits, dc_size) as i32;
        }
        zz[0] = dc_pred[sci].clamp(i16::MIN as i32, i16::MAX as i32) as i16;

        let mut k = 1;
        while k < 64 {
            let rs = ac_tab.decode(&mut reader)?;
            let run = (rs >> 4) as usize;
            let size = rs & 0x0F;
            if size == 0 {
                if run == 15 {
                    k += 16;
                    continue;
                }
                break;
            }
            k += run;
            if k >= 64 {
                return Err(JpegError::HuffmanDecode);
            }
            let bits = reader.read_bits(size)?;
            zz[k] = extend_sign(bits, size);
            k += 1;
        }

        // Blocks beyond the grid (malformed sampling) are decoded and dropped.
        let grid = &mut grids[sci];
        if br < grid.blocks_tall() && bc < grid.blocks_wide() {
            let block = grid.block_mut(br, bc);
            for (zi, &v) in zz.iter().enumerate() {
                block[ZIGZAG_TO_NATURAL[zi]] = v;
            }
        }
        Ok(())
    })?;

    Ok((grids, reader.position()))
}

/// Receives the Huffman symbols and raw bits of an encoded scan.
trait SymbolSink {
    fn dc(&mut self, table: usize, symbol: u8, bits: u16) -> crate::Result<()>;
    fn ac(&mut self, table: usize, symbol: u8, bits: u16) -> crate::Result<()>;
    fn restart(&mut self, _index: u16) -> crate::Result<()> {
        Ok(())
    }
}

fn emit_blocks<S: SymbolSink>(
    sink: &mut S,
    frame: &FrameInfo,
    scan_components: &[ScanComponent],
    grids: &[DctGrid],
    restart_interval: u16,
) -> crate::Result<()> {
    let mut dc_pred = vec![0i32; scan_components.len()];
    let mut restarts = 0u16;

    walk_mcus(frame, scan_components, restart_interval, |sci, br, bc, restart| {
        if restart {
            sink.restart(restarts)?;
            restarts = restarts.wrapping_add(1);
            dc_pred.iter_mut().for_each(|p| *p = 0);
        }
        let sc = &scan_components[sci];
        let block = grids[sci].block(br, bc);
        let mut zz = [0i16; 64];
        for (ni, &v) in block.iter().enumerate() {
            zz[NATURAL_TO_ZIGZAG[ni]] = v;
        }

        let diff = zz[0] as i32 - dc_pred[sci];
        dc_pred[sci] = zz[0] as i32;
        let diff = i16::try_from(diff)
            .map_err(|_| crate::Error::ImageOutputFailure("DC difference out of range"))?;
        let (bits, size) = encode_value(diff);
        sink.dc(sc.dc_table, size, bits)?;

        let mut k = 1;
        while k < 64 {
            let mut run = 0usize;
            while k + run < 64 && zz[k + run] == 0 {
                run += 1;
            }
            if k + run >= 64 {
                sink.ac(sc.ac_table, 0x00, 0)?;
                break;
            }
            while run >= 16 {
                sink.ac(sc.ac_table, 0xF0, 0)?;
                run -= 16;
                k += 16;
            }
            k += run;
            let (bits, size) = encode_value(zz[k]);
            if size > 10 {
                return Err(crate::Error::ImageOutputFailure("AC coefficient out of range"));
            }
            sink.ac(sc.ac_table, ((run as u8) << 4) | size, bits)?;
            k += 1;
        }
        Ok(())
    })
}

struct FrequencySink {
    dc: [Vec<u32>; 4],
    ac: [Vec<u32>; 4],
}

impl SymbolSink for FrequencySink {
    fn dc(&mut self, table: usize, symbol: u8, _bits: u16) -> crate::Result<()> {
        self.dc[table][symbol as usize] += 1;
        Ok(())
    }

    fn ac(&mut self, table: usize, symbol: u8, _bits: u16) -> crate::Result<()> {
        self.ac[table][symbol as usize] += 1;
        Ok(())
    }
}

/// Symbol frequencies per DC and AC table; tables the scan never uses stay
/// empty.
pub fn count_symbols(
    frame: &FrameInfo,
    scan_components: &[ScanComponent],
    grids: &[DctGrid],
    restart_interval: u16,
) -> crate::Result<([Vec<u32>; 4], [Vec<u32>; 4])> {
    let mut sink = FrequencySink { dc: Default::default(), ac: Default::default() };
    for sc in scan_components {
        sink.dc[sc.dc_table].resize(256, 0);
        sink.ac[sc.ac_table].resize(256, 0);
    }
    emit_blocks(&mut sink, frame, scan_components, grids, restart_interval)?;
    Ok((sink.dc, sink.ac))
}

struct BitFileSink<'a> {
    out: &'a mut BitFile,
    dc: [Option<HuffmanEncodeTable>; 4],
    ac: [Option<HuffmanEncodeTable>; 4],
}

fn put_symbol(out: &mut BitFile, table: Option<&HuffmanEncodeTable>, symbol: u8, bits: u16) -> crate::Result<()> {
    let table = table.ok_or(crate::Error::ImageOutputFailure("missing Huffman table"))?;
    let (code, len) = table.encode(symbol)?;
    out.write_bits(code as u32, len)?;
    let size = symbol & 0x0F;
    if size > 0 {
        out.write_bits(bits as u32, size)?;
    }
    Ok(())
}

impl SymbolSink for BitFileSink<'_> {
    fn dc(&mut self, table: usize, symbol: u8, bits: u16) -> crate::Result<()> {
        put_symbol(self.out, self.dc[table].as_ref(), symbol, bits)
    }

    fn ac(&mut self, table: usize, symbol: u8, bits: u16) -> crate::Result<()> {
        put_symbol(self.out, self.ac[table].as_ref(), symbol, bits)
    }

    fn restart(&mut self, index: u16) -> crate::Result<()> {
        self.out.commit_entropy_segment()?;
        self.out.write_marker(0xFFD0 + (index % 8))?;
        self.out.begin_entropy_segment()
    }
}

/// Encode the grids as entropy-coded data (RST markers included) into `out`.
pub fn encode_scan(
    out: &mut BitFile,
    frame: &FrameInfo,
    scan_components: &[ScanComponent],
    grids: &[DctGrid],
    dc_specs: &[Option<HuffmanSpec>; 4],
    ac_specs: &[Option<HuffmanSpec>; 4],
    restart_interval: u16,
) -> crate::Result<()> {
    let build = |specs: &[Option<HuffmanSpec>; 4]| -> [Option<HuffmanEncodeTable>; 4] {
        let mut tables: [Option<HuffmanEncodeTable>; 4] = Default::default();
        for (slot, spec) in tables.iter_mut().zip(specs) {
            *slot = spec.as_ref().map(HuffmanEncodeTable::build);
        }
        tables
    };
    out.begin_entropy_segment()?;
    let mut sink = BitFileSink { out, dc: build(dc_specs), ac: build(ac_specs) };
    emit_blocks(&mut sink, frame, scan_components, grids, restart_interval)?;
    sink.out.commit_entropy_segment()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::huffman::build_huffman_spec;

    fn one_component(width: u16, height: u16) -> (FrameInfo, Vec<ScanComponent>) {
        let mut frame = FrameInfo::ycbcr_444(width, height).unwrap();
        frame.components.truncate(1);
        (frame, vec![ScanComponent { comp_idx: 0, dc_table: 0, ac_table: 0 }])
    }

    fn specs(freq: ([Vec<u32>; 4], [Vec<u32>; 4])) -> ([Option<HuffmanSpec>; 4], [Option<HuffmanSpec>; 4]) {
        let mut dc: [Option<HuffmanSpec>; 4] = Default::default();
        let mut ac: [Option<HuffmanSpec>; 4] = Default::default();
        for id in 0..4 {
            if !freq.0[id].is_empty() {
                dc[id] = Some(build_huffman_spec(0, id as u8, &freq.0[id]));
            }
            if !freq.1[id].is_empty() {
                ac[id] = Some(build_huffman_spec(1, id as u8, &freq.1[id]));
            }
        }
        (dc, ac)
    }

    fn encode_decode(restart_interval: u16) {
        let (frame, comps) = one_component(40, 24);
        let mut grid = DctGrid::new(frame.blocks_wide(0), frame.blocks_tall(0));
        for (i, v) in grid.coeffs_mut().iter_mut().enumerate() {
            *v = match i % 64 {
                0 => (i as i16 / 64) * 13 - 90,
                k if k < 10 => ((i * 7) % 11) as i16 - 5,
                37 => -1023,
                _ => 0,
            };
        }
        let grids = vec![grid];
        let freq = count_symbols(&frame, &comps, &grids, restart_interval).unwrap();
        let (dc, ac) = specs(freq);

        let mut out = BitFile::for_write();
        encode_scan(&mut out, &frame, &comps, &grids, &dc, &ac, restart_interval).unwrap();
        let bytes = out.into_data().unwrap();
        let (decoded, end) = decode_scan(&bytes, 0, &frame, &comps, &dc, &ac, restart_interval).unwrap();
        assert_eq!(decoded[0].coeffs(), grids[0].coeffs());
        assert_eq!(end, bytes.len());
    }

    #[test]
    fn scan_survives_encode_decode() {
        encode_decode(0);
    }

    #[test]
    fn restart_markers_are_written_and_honoured() {
        encode_decode(4);
    }

    #[test]
    fn missing_table_is_reported() {
        let (frame, comps) = one_component(8, 8);
        let dc: [Option<HuffmanSpec>; 4] = Default::default();
        let ac: [Option<HuffmanSpec>; 4] = Default::default();
        assert!(matches!(
            decode_scan(&[0u8; 4], 0, &frame, &comps, &dc, &ac, 0),
            Err(JpegError::InvalidHuffmanTableId(0))
        ));
    }
}
