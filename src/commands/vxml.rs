use anyhow::{Context, Result};
use bufstream_core::message::{
    clocks_per_frame, PicStartInfo, SeqStartInfo, VideoAuUnit, GOPHDR_FLAG, SEQHDR_FLAG,
};
use bufstream_core::{shared, write_all, ByteChannel, Message, RwFileChannel, TmpFileChannel};
use bufstream_filters::{HeaderEncoding, VxmlFilter, XmlOptions};
use std::ops::Range;
use std::path::{Path, PathBuf};

const PICTURE_START: u8 = 0x00;
const SEQUENCE_HEADER: u8 = 0xB3;
const SEQUENCE_END: u8 = 0xB7;
const GROUP_START: u8 = 0xB8;

/// One coded picture and the headers in front of it.
#[derive(Debug, PartialEq)]
struct Picture {
    /// Sequence/GOP headers (and anything else) since the previous picture.
    prefix: Range<usize>,
    /// Picture header through the last slice.
    body: Range<usize>,
    seq: Option<SeqStartInfo>,
    gop: Option<Vec<u8>>,
    temp_ref: u16,
    pict_type: u16,
}

/// Positions and codes of every `00 00 01 xx` start code.
fn start_codes(data: &[u8]) -> Vec<(usize, u8)> {
    let mut codes = Vec::new();
    let mut i = 0;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            codes.push((i, data[i + 3]));
            i += 4;
        } else {
            i += 1;
        }
    }
    codes
}

fn byte(data: &[u8], at: usize) -> u8 {
    data.get(at).copied().unwrap_or(0)
}

/// Split an elementary stream into pictures; the second value is whatever
/// follows the last picture.
fn scan(data: &[u8]) -> (Vec<Picture>, Range<usize>) {
    let codes = start_codes(data);
    let mut pictures = Vec::new();
    let mut prefix_start = 0;
    let mut seq = None;
    let mut gop = None;

    for (idx, &(pos, code)) in codes.iter().enumerate() {
        match code {
            SEQUENCE_HEADER => {
                seq = Some(SeqStartInfo {
                    frame_rate_code: u32::from(byte(data, pos + 7) & 0x0F),
                    ..SeqStartInfo::default()
                });
            }
            GROUP_START => gop = Some(data[pos + 4..(pos + 8).min(data.len())].to_vec()),
            PICTURE_START => {
                if pos < prefix_start {
                    continue;
                }
                let end = codes[idx + 1..]
                    .iter()
                    .find(|(_, c)| matches!(*c, PICTURE_START | SEQUENCE_HEADER | GROUP_START | SEQUENCE_END))
                    .map_or(data.len(), |(p, _)| *p);
                let (b4, b5) = (byte(data, pos + 4), byte(data, pos + 5));
                pictures.push(Picture {
                    prefix: prefix_start..pos,
                    body: pos..end,
                    seq: seq.take(),
                    gop: gop.take(),
                    temp_ref: (u16::from(b4) << 2) | u16::from(b5 >> 6),
                    pict_type: u16::from((b5 >> 3) & 0x07),
                });
                prefix_start = end;
            }
            _ => {}
        }
    }
    (pictures, prefix_start..data.len())
}

/// Default index path: the output with an `.xml` extension.
pub fn xml_path(output: &Path, xml: Option<&Path>) -> PathBuf {
    xml.map_or_else(|| output.with_extension("xml"), Path::to_path_buf)
}

/// Copy the stream at `input` to `output` and write its XML index.
pub fn run(input: &Path, output: &Path, xml: &Path, encoding: HeaderEncoding, chunk_size: usize) -> Result<usize> {
    let data = std::fs::read(input).with_context(|| format!("Failed to read input: {:?}", input))?;
    let (pictures, tail) = scan(&data);
    if pictures.is_empty() {
        anyhow::bail!("No picture start codes found in {:?}", input);
    }

    let main = TmpFileChannel::create(output, chunk_size)
        .with_context(|| format!("Failed to create output: {:?}", output))?;
    let sidecar = shared(
        RwFileChannel::create(xml, chunk_size).with_context(|| format!("Failed to create index: {:?}", xml))?,
    );
    let options = XmlOptions {
        encoding,
        sizes_only: false,
    };
    let mut filter = VxmlFilter::new(main, sidecar.clone(), options);

    if let Err(e) = drive(&mut filter, &data, &pictures, tail) {
        if let Err(abort) = filter.close_discarding_pending() {
            tracing::warn!("Failed to discard partial output: {}", abort);
        }
        return Err(e);
    }
    filter.close()?;
    sidecar.lock().finish(false)?;

    tracing::info!("Indexed {} pictures into {:?}", pictures.len(), xml);
    Ok(pictures.len())
}

fn drive<C: ByteChannel>(filter: &mut VxmlFilter<C>, data: &[u8], pictures: &[Picture], tail: Range<usize>) -> Result<()> {
    let mut cpf = 0;
    let mut gop_base = 0i64;
    let mut gop_frames = 0i64;
    let mut decoded = 0i64;

    for picture in pictures {
        let mut flags = 0;
        if let Some(info) = picture.seq {
            if cpf == 0 {
                cpf = clocks_per_frame(info.frame_rate_code);
            }
            filter.message(0, &mut Message::SeqStart(info))?;
            flags |= SEQHDR_FLAG;
        }
        write_all(filter, &data[picture.prefix.clone()])?;
        if let Some(gop) = &picture.gop {
            filter.message(0, &mut Message::GopStart(gop.clone()))?;
            flags |= GOPHDR_FLAG;
        }
        if flags != 0 {
            gop_base += gop_frames;
            gop_frames = 0;
        }

        let info = PicStartInfo {
            pict_type: u32::from(picture.pict_type),
            temp_ref: u32::from(picture.temp_ref),
            ..PicStartInfo::default()
        };
        filter.message(0, &mut Message::PictureStart(info))?;
        let body = &data[picture.body.clone()];
        write_all(filter, body)?;
        let au = VideoAuUnit {
            length: u32::try_from(body.len())?,
            pic_type: picture.pict_type,
            flags,
            dts: decoded * cpf,
            pts: (gop_base + i64::from(picture.temp_ref)) * cpf,
            ..VideoAuUnit::default()
        };
        filter.message(0, &mut Message::VideoAu(au))?;
        gop_frames += 1;
        decoded += 1;
    }
    write_all(filter, &data[tail])?;
    Ok(())
}
