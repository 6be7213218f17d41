//! Text subtitle writer.
//!
//! A demuxer announces each chunk with a `DmuxChunk` message and then
//! commits its bytes. A unit runs from a chunk flagged unit start to one
//! flagged unit end; it is written when the next chunk or a `SampleInfo`
//! message arrives, the latter supplying the display duration.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, trace, warn};

use super::{check_lease, ignore};
use crate::channel::ByteChannel;
use crate::error::{Error, Result};
use crate::message::{DmuxChunk, Message, SampleInfo};

/// Default input buffer size; leases are limited to half of it.
pub const SUBTITLE_BUFFER_SIZE: usize = 1024 * 1024;

/// Display time of a unit without timing information, 100 ms in 27 MHz ticks.
pub const DEFAULT_DURATION: i64 = 2_700_000;

const SSA_HEADER: &str =
    "[Script Info]\n; This is a Sub Station Alpha v4 script.\nScriptType: v4.00\n\n[Events]\n";
const ASS_HEADER: &str =
    "[Script Info]\n; This is an Advanced Sub Station Alpha v4+ script.\nScriptType: v4.00+\n\n[Events]\n";
const VOBSUB_HEADER: &str = "# VobSub index file, v7 (do not modify this line!)\n\n# Settings\n\n";
const VOBSUB_FOOTER: &str = "# Language index in use\nlangidx: 0\n\nid: ";

/// Output file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    /// SubRip, UTF-8 text.
    Srt,
    /// Sub Station Alpha v4.
    Ssa,
    /// Advanced Sub Station Alpha v4+.
    Ass,
    /// VobSub index, with the subpicture data in a separate file.
    VobSub,
}

impl FromStr for SubtitleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "srt" | "utf8" => Ok(Self::Srt),
            "ssa" => Ok(Self::Ssa),
            "ass" => Ok(Self::Ass),
            "idx" | "vobsub" => Ok(Self::VobSub),
            "dxsb" | "usf" => Err(Error::unsupported(format!("{s} subtitle output"))),
            other => Err(Error::format(format!("unknown subtitle format '{other}'"))),
        }
    }
}

/// ISO 639-2 (bibliographic or terminology) to ISO 639-1.
const LANGUAGES: &[(&str, &str)] = &[
    ("aar", "aa"), ("abk", "ab"), ("afr", "af"), ("aka", "ak"), ("alb", "sq"), ("amh", "am"),
    ("ara", "ar"), ("arg", "an"), ("arm", "hy"), ("asm", "as"), ("ava", "av"), ("ave", "ae"),
    ("aym", "ay"), ("aze", "az"), ("bak", "ba"), ("bam", "bm"), ("baq", "eu"), ("bel", "be"),
    ("ben", "bn"), ("bih", "bh"), ("bis", "bi"), ("bod", "bo"), ("bos", "bs"), ("bre", "br"),
    ("bul", "bg"), ("bur", "my"), ("cat", "ca"), ("ces", "cs"), ("cha", "ch"), ("che", "ce"),
    ("chi", "zh"), ("chu", "cu"), ("chv", "cv"), ("cor", "kw"), ("cos", "co"), ("cre", "cr"),
    ("cym", "cy"), ("cze", "cs"), ("dan", "da"), ("deu", "de"), ("div", "dv"), ("dut", "nl"),
    ("dzo", "dz"), ("ell", "el"), ("eng", "en"), ("epo", "eo"), ("est", "et"), ("eus", "eu"),
    ("ewe", "ee"), ("fao", "fo"), ("fas", "fa"), ("fij", "fj"), ("fin", "fi"), ("fra", "fr"),
    ("fre", "fr"), ("fry", "fy"), ("ful", "ff"), ("geo", "ka"), ("ger", "de"), ("gla", "gd"),
    ("gle", "ga"), ("glg", "gl"), ("glv", "gv"), ("gre", "el"), ("grn", "gn"), ("guj", "gu"),
    ("hat", "ht"), ("hau", "ha"), ("heb", "he"), ("her", "hz"), ("hin", "hi"), ("hmo", "ho"),
    ("hrv", "hr"), ("hun", "hu"), ("hye", "hy"), ("ibo", "ig"), ("ice", "is"), ("ido", "io"),
    ("iii", "ii"), ("iku", "iu"), ("ile", "ie"), ("ina", "ia"), ("ind", "id"), ("ipk", "ik"),
    ("isl", "is"), ("ita", "it"), ("jav", "jv"), ("jpn", "ja"), ("kal", "kl"), ("kan", "kn"),
    ("kas", "ks"), ("kat", "ka"), ("kau", "kr"), ("kaz", "kk"), ("khm", "km"), ("kik", "ki"),
    ("kin", "rw"), ("kir", "ky"), ("kom", "kv"), ("kon", "kg"), ("kor", "ko"), ("kua", "kj"),
    ("kur", "ku"), ("lao", "lo"), ("lat", "la"), ("lav", "lv"), ("lim", "li"), ("lin", "ln"),
    ("lit", "lt"), ("ltz", "lb"), ("lub", "lu"), ("lug", "lg"), ("mac", "mk"), ("mah", "mh"),
    ("mal", "ml"), ("mao", "mi"), ("mar", "mr"), ("may", "ms"), ("mkd", "mk"), ("mlg", "mg"),
    ("mlt", "mt"), ("mon", "mn"), ("mri", "mi"), ("msa", "ms"), ("mya", "my"), ("nau", "na"),
    ("nav", "nv"), ("nbl", "nr"), ("nde", "nd"), ("ndo", "ng"), ("nep", "ne"), ("nld", "nl"),
    ("nno", "nn"), ("nob", "nb"), ("nor", "no"), ("nya", "ny"), ("oci", "oc"), ("oji", "oj"),
    ("ori", "or"), ("orm", "om"), ("oss", "os"), ("pan", "pa"), ("per", "fa"), ("pli", "pi"),
    ("pol", "pl"), ("por", "pt"), ("pus", "ps"), ("que", "qu"), ("roh", "rm"), ("ron", "ro"),
    ("rum", "ro"), ("run", "rn"), ("rus", "ru"), ("sag", "sg"), ("san", "sa"), ("sin", "si"),
    ("slk", "sk"), ("slo", "sk"), ("slv", "sl"), ("sme", "se"), ("smo", "sm"), ("sna", "sn"),
    ("snd", "sd"), ("som", "so"), ("sot", "st"), ("spa", "es"), ("sqi", "sq"), ("srd", "sc"),
    ("srp", "sr"), ("ssw", "ss"), ("sun", "su"), ("swa", "sw"), ("swe", "sv"), ("tah", "ty"),
    ("tam", "ta"), ("tat", "tt"), ("tel", "te"), ("tgk", "tg"), ("tgl", "tl"), ("tha", "th"),
    ("tib", "bo"), ("tir", "ti"), ("ton", "to"), ("tsn", "tn"), ("tso", "ts"), ("tuk", "tk"),
    ("tur", "tr"), ("twi", "tw"), ("uig", "ug"), ("ukr", "uk"), ("urd", "ur"), ("uzb", "uz"),
    ("ven", "ve"), ("vie", "vi"), ("vol", "vo"), ("wel", "cy"), ("wln", "wa"), ("wol", "wo"),
    ("xho", "xh"), ("yid", "yi"), ("yor", "yo"), ("zha", "za"), ("zho", "zh"), ("zul", "zu"),
];

/// Two letter language code for a three letter one, two spaces when unknown.
pub fn iso_639_1(code: &str) -> &'static str {
    let code = code.to_ascii_lowercase();
    LANGUAGES
        .binary_search_by(|(long, _)| (*long).cmp(code.as_str()))
        .map(|i| LANGUAGES[i].1)
        .unwrap_or("  ")
}

/// Sign and clock fields of a 27 MHz timestamp, rounded to `per_second`.
fn clock(ticks: i64, per_second: u64) -> (&'static str, u64, u64, u64, u64) {
    let tick = 27_000_000 / per_second;
    let total = (ticks.unsigned_abs() + tick / 2) / tick;
    let secs = total / per_second;
    let sign = if ticks < 0 { "-" } else { "" };
    (sign, secs / 3600, secs / 60 % 60, secs % 60, total % per_second)
}

fn srt_time(ticks: i64) -> String {
    let (sign, h, m, s, ms) = clock(ticks, 1000);
    format!("{sign}{h:02}:{m:02}:{s:02},{ms:03}")
}

fn ssa_time(ticks: i64) -> String {
    let (sign, h, m, s, cs) = clock(ticks, 100);
    format!("{sign}{h}:{m:02}:{s:02}.{cs:02}")
}

fn vobsub_time(ticks: i64) -> String {
    let (sign, h, m, s, ms) = clock(ticks, 1000);
    format!("{sign}{h:02}:{m:02}:{s:02}:{ms:03}")
}

/// SSA event text after the read order and layer fields, or all of it when
/// they are missing.
fn ssa_event_fields(text: &[u8]) -> &[u8] {
    text.iter()
        .enumerate()
        .filter(|&(_, &b)| b == b',')
        .nth(1)
        .map_or(text, |(i, _)| &text[i..])
}

#[derive(Debug, Clone, Copy)]
struct Unit {
    pts: i64,
    len: usize,
    duration: i64,
}

/// Writes demuxed text subtitles as SRT, SSA/ASS or a VobSub index.
pub struct SubtitleChannel {
    out: Option<File>,
    path: PathBuf,
    format: SubtitleFormat,
    /// VobSub subpicture file and the next write position in it.
    data: Option<(File, PathBuf)>,
    filepos: u64,
    extra_data: Option<Vec<u8>>,
    language: Option<String>,
    buf: Vec<u8>,
    idx: usize,
    chunk_size: usize,
    headers_written: bool,
    unit: Option<Unit>,
    queued: bool,
    count: u32,
    byte_count: u64,
}

impl SubtitleChannel {
    /// Create `path`. VobSub data goes next to it with a `.sub` extension.
    pub fn create(path: impl AsRef<Path>, format: SubtitleFormat) -> Result<Self> {
        let path = path.as_ref();
        match format {
            SubtitleFormat::VobSub => Self::create_vobsub(path, path.with_extension("sub")),
            _ => Self::open(path, format, None),
        }
    }

    /// Create a VobSub index at `index` and its subpicture data at `data`.
    pub fn create_vobsub(index: impl AsRef<Path>, data: impl AsRef<Path>) -> Result<Self> {
        let data = data.as_ref().to_path_buf();
        let file = File::create(&data)?;
        Self::open(index.as_ref(), SubtitleFormat::VobSub, Some((file, data)))
    }

    fn open(path: &Path, format: SubtitleFormat, data: Option<(File, PathBuf)>) -> Result<Self> {
        let out = File::create(path)?;
        debug!(path = %path.display(), ?format, "opened subtitle file");
        Ok(Self {
            out: Some(out),
            path: path.to_path_buf(),
            format,
            data,
            filepos: 0,
            extra_data: None,
            language: None,
            buf: vec![0; SUBTITLE_BUFFER_SIZE],
            idx: 0,
            chunk_size: SUBTITLE_BUFFER_SIZE / 2,
            headers_written: false,
            unit: None,
            queued: false,
            count: 0,
            byte_count: 0,
        })
    }

    /// Codec private data: the script header for SSA/ASS, the settings
    /// block for VobSub.
    pub fn with_extra_data(mut self, extra: impl Into<Vec<u8>>) -> Self {
        let extra = extra.into();
        self.extra_data = (!extra.is_empty()).then_some(extra);
        self
    }

    /// Three letter language code written to a VobSub index.
    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.language = Some(code.into());
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buf = vec![0; size];
        self.chunk_size = size / 2;
        self.idx = 0;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subtitle entries written so far.
    pub fn entries(&self) -> u32 {
        self.count
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        let out = self.out.as_mut().ok_or(Error::Closed)?;
        out.write_all(bytes)?;
        self.byte_count += bytes.len() as u64;
        Ok(())
    }

    fn write_headers(&mut self) -> Result<()> {
        let mut header = Vec::new();
        match self.format {
            SubtitleFormat::Srt => {}
            SubtitleFormat::Ssa | SubtitleFormat::Ass => match &self.extra_data {
                Some(extra) => {
                    header.extend_from_slice(extra);
                    header.push(b'\n');
                    if !String::from_utf8_lossy(extra).contains("[Events]") {
                        header.extend_from_slice(b"[Events]\n");
                    }
                }
                None if self.format == SubtitleFormat::Ssa => header.extend_from_slice(SSA_HEADER.as_bytes()),
                None => header.extend_from_slice(ASS_HEADER.as_bytes()),
            },
            SubtitleFormat::VobSub => {
                if let Some(extra) = &self.extra_data {
                    header.extend_from_slice(VOBSUB_HEADER.as_bytes());
                    header.extend_from_slice(extra);
                    header.extend_from_slice(b"\n\n");
                }
                header.extend_from_slice(VOBSUB_FOOTER.as_bytes());
                let language = self.language.as_deref().map_or("  ", iso_639_1);
                header.extend_from_slice(format!("{language}, index: 0\n").as_bytes());
            }
        }
        self.headers_written = true;
        if header.is_empty() {
            return Ok(());
        }
        trace!(len = header.len(), "subtitle header");
        self.emit(&header)
    }

    /// Write the open unit from the buffered bytes.
    fn write_unit(&mut self) -> Result<()> {
        self.queued = false;
        let Some(unit) = self.unit.take() else {
            return Ok(());
        };
        if unit.len != self.idx {
            return Err(Error::protocol(format!(
                "subtitle unit announced {} bytes but {} arrived",
                unit.len, self.idx
            )));
        }
        let text = &self.buf[..self.idx];
        let end = unit.pts + unit.duration;
        let entry = match self.format {
            SubtitleFormat::Srt => {
                let mut entry = format!("{}\n{} --> {}\n", self.count + 1, srt_time(unit.pts), srt_time(end)).into_bytes();
                entry.extend_from_slice(text);
                entry.extend_from_slice(b"\n\n");
                entry
            }
            SubtitleFormat::Ssa | SubtitleFormat::Ass => {
                let mut entry = format!("Dialogue: Marked=0,{},{}", ssa_time(unit.pts), ssa_time(end)).into_bytes();
                entry.extend_from_slice(ssa_event_fields(text));
                entry.push(b'\n');
                entry
            }
            SubtitleFormat::VobSub => {
                let (data, _) = self.data.as_mut().ok_or(Error::Closed)?;
                data.write_all(text)?;
                let entry = format!("timestamp: {}, filepos: {:09X}\n", vobsub_time(unit.pts), self.filepos);
                self.filepos += text.len() as u64;
                entry.into_bytes()
            }
        };
        self.idx = 0;
        self.emit(&entry)?;
        self.count += 1;
        trace!(pts = unit.pts, duration = unit.duration, len = unit.len, "subtitle entry");
        Ok(())
    }

    fn on_chunk(&mut self, chunk: &DmuxChunk) -> Result<()> {
        let len = usize::try_from(chunk.length)
            .map_err(|_| Error::protocol(format!("negative chunk length {}", chunk.length)))?;
        if !self.headers_written {
            // bytes ahead of the first unit start are dropped
            self.idx = 0;
            if !chunk.is_unit_start() {
                return Ok(());
            }
            self.write_headers()?;
        }
        if self.queued {
            self.write_unit()?;
        }
        match self.unit.as_mut() {
            Some(unit) if !chunk.is_unit_start() => unit.len += len,
            _ => {
                // a new start closes a unit that never saw its end flag
                if self.unit.is_some() {
                    self.write_unit()?;
                }
                self.unit = Some(Unit {
                    pts: chunk.pts,
                    len,
                    duration: DEFAULT_DURATION,
                });
            }
        }
        if chunk.is_unit_end() {
            self.queued = true;
        }
        Ok(())
    }

    fn on_sample_info(&mut self, info: &SampleInfo) -> Result<()> {
        if !self.queued {
            return Ok(());
        }
        if let (Some(unit), Some(duration)) = (self.unit.as_mut(), info.duration()) {
            unit.duration = duration;
        }
        self.write_unit()
    }
}

impl ByteChannel for SubtitleChannel {
    fn capacity(&self) -> usize {
        self.buf.len() - self.idx
    }

    fn lease(&mut self, n: usize) -> Result<&mut [u8]> {
        if self.out.is_none() {
            return Err(Error::Closed);
        }
        check_lease(n, self.chunk_size)?;
        if self.idx + n > self.buf.len() {
            return Err(Error::Unavailable {
                requested: n,
                available: self.buf.len() - self.idx,
            });
        }
        Ok(&mut self.buf[self.idx..self.idx + n])
    }

    fn commit(&mut self, n: usize) -> Result<usize> {
        if self.idx + n > self.buf.len() {
            return Err(Error::protocol("commit exceeds the leased region"));
        }
        self.idx += n;
        Ok(n)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn split(&mut self) -> Result<()> {
        Err(Error::unsupported("subtitle output cannot be split"))
    }

    fn message(&mut self, _offset: u32, msg: &mut Message) -> Result<()> {
        match msg {
            Message::ByteCount(n) => {
                *n = self.byte_count;
                Ok(())
            }
            Message::FileName(name) => {
                *name = Some(self.path.clone());
                Ok(())
            }
            Message::DmuxChunk(chunk) => self.on_chunk(chunk),
            Message::SampleInfo(info) => self.on_sample_info(info),
            other => ignore(other),
        }
    }

    fn finish(&mut self, abort: bool) -> Result<()> {
        if self.out.is_none() {
            return Ok(());
        }
        let result = if abort || self.unit.is_none() {
            Ok(())
        } else {
            self.write_unit()
        };
        if self.idx > 0 {
            warn!(bytes = self.idx, "subtitle bytes outside any unit dropped");
            self.idx = 0;
        }
        let flushed = match (self.out.take(), self.data.take()) {
            (Some(mut out), Some((mut data, _))) => out.flush().and_then(|_| data.flush()),
            (Some(mut out), None) => out.flush(),
            _ => Ok(()),
        };
        debug!(path = %self.path.display(), entries = self.count, abort, "subtitle file closed");
        result.and(flushed.map_err(Error::from))
    }
}

impl Drop for SubtitleChannel {
    fn drop(&mut self) {
        if let Err(e) = self.finish(false) {
            warn!("subtitle channel teardown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::dmux_flags::{UNIT_END, UNIT_START};
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    fn chunk(flags: u32, pts: i64, length: i32) -> Message {
        Message::DmuxChunk(DmuxChunk {
            length,
            flags,
            pts,
            ..Default::default()
        })
    }

    /// Announce and commit one whole unit.
    fn send(ch: &mut SubtitleChannel, pts: i64, text: &[u8]) {
        ch.message(0, &mut chunk(UNIT_START | UNIT_END, pts, text.len() as i32))
            .unwrap();
        ch.bulk_transfer(text).unwrap();
    }

    fn timing(start: i64, stop: i64) -> Message {
        Message::SampleInfo(SampleInfo {
            rt_start: start,
            rt_stop: stop,
            timestamp_valid: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_srt_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.srt");
        let mut ch = SubtitleChannel::create(&path, SubtitleFormat::Srt).unwrap();

        send(&mut ch, 27_000_000, b"Hello");
        ch.message(0, &mut timing(0, 54_000_000)).unwrap();
        assert_eq!(ch.entries(), 1);

        // split over two chunks, written at close with the default duration
        ch.message(0, &mut chunk(UNIT_START, 108_000_000, 3)).unwrap();
        ch.bulk_transfer(b"Wor").unwrap();
        ch.message(0, &mut chunk(UNIT_END, 0, 2)).unwrap();
        ch.bulk_transfer(b"ld").unwrap();
        ch.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "1\n00:00:01,000 --> 00:00:03,000\nHello\n\n2\n00:00:04,000 --> 00:00:04,100\nWorld\n\n"
        );
    }

    #[test]
    fn test_next_chunk_writes_queued_unit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("q.srt");
        let mut ch = SubtitleChannel::create(&path, SubtitleFormat::Srt).unwrap();
        send(&mut ch, 0, b"a");
        send(&mut ch, 27_000, b"b");
        assert_eq!(ch.entries(), 1);
        assert_eq!(ch.byte_count().unwrap(), "1\n00:00:00,000 --> 00:00:00,100\na\n\n".len() as u64);
        ch.close_discarding_pending().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("\nb\n"));
    }

    #[test]
    fn test_ass_dialogue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.ass");
        let mut ch = SubtitleChannel::create(&path, SubtitleFormat::Ass).unwrap();
        send(&mut ch, 40_500_000, b"0,0,Default,,0,0,0,,Hi there");
        send(&mut ch, 81_000_000, b"no fields");
        ch.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let expected = format!(
            "{ASS_HEADER}Dialogue: Marked=0,0:00:01.50,0:00:01.60,Default,,0,0,0,,Hi there\n\
             Dialogue: Marked=0,0:00:03.00,0:00:03.10no fields\n"
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_ssa_extra_data_gets_events_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.ssa");
        let mut ch = SubtitleChannel::create(&path, SubtitleFormat::Ssa)
            .unwrap()
            .with_extra_data("[Script Info]\nTitle: x");
        send(&mut ch, 0, b"1,0,x");
        ch.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[Script Info]\nTitle: x\n[Events]\nDialogue: "));
        assert!(text.ends_with(",0:00:00.10,x\n"));
    }

    #[test]
    fn test_vobsub_index_and_data() {
        let dir = tempdir().unwrap();
        let idx = dir.path().join("out.idx");
        let mut ch = SubtitleChannel::create(&idx, SubtitleFormat::VobSub)
            .unwrap()
            .with_language("ger")
            .with_extra_data("size: 720x576");
        send(&mut ch, 27_000_000, &[1, 2, 3]);
        send(&mut ch, 3_600 * 27_000_000, &[4, 5, 6, 7]);
        ch.close().unwrap();

        let text = std::fs::read_to_string(&idx).unwrap();
        assert_eq!(
            text,
            format!(
                "{VOBSUB_HEADER}size: 720x576\n\n{VOBSUB_FOOTER}de, index: 0\n\
                 timestamp: 00:00:01:000, filepos: 000000000\n\
                 timestamp: 01:00:00:000, filepos: 000000003\n"
            )
        );
        assert_eq!(std::fs::read(dir.path().join("out.sub")).unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_bytes_before_first_unit_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.srt");
        let mut ch = SubtitleChannel::create(&path, SubtitleFormat::Srt).unwrap();
        ch.message(0, &mut chunk(0, 0, 2)).unwrap();
        ch.bulk_transfer(b"xx").unwrap();
        send(&mut ch, 0, b"ok");
        ch.close().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("\nok\n\n"));
        assert!(!text.contains("xx"));
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let dir = tempdir().unwrap();
        let mut ch = SubtitleChannel::create(dir.path().join("m.srt"), SubtitleFormat::Srt).unwrap();
        send(&mut ch, 0, b"ok");
        ch.bulk_transfer(b"!").unwrap();
        assert_matches!(ch.message(0, &mut timing(0, 1)), Err(Error::Protocol(_)));
        assert_matches!(ch.message(0, &mut chunk(UNIT_START, 0, -1)), Err(Error::Protocol(_)));
    }

    #[test]
    fn test_channel_limits() {
        let dir = tempdir().unwrap();
        let mut ch = SubtitleChannel::create(dir.path().join("l.srt"), SubtitleFormat::Srt)
            .unwrap()
            .with_buffer_size(16);
        assert_eq!(ch.chunk_size(), 8);
        assert_matches!(ch.lease(9), Err(Error::Unavailable { .. }));
        assert_matches!(ch.split(), Err(Error::Unsupported(_)));
        assert_eq!(ch.file_name().unwrap(), Some(dir.path().join("l.srt")));
    }

    #[test]
    fn test_time_formats() {
        assert_eq!(srt_time(-27_000), "-00:00:00,001");
        // 1:01:01.9996 rounds up into the next second
        assert_eq!(srt_time(98_873_989_200), "01:01:02,000");
        assert_eq!(ssa_time(36_000 * 27_000_000 + 13_500_000), "10:00:00.50");
        assert_eq!(vobsub_time(27_000_000 * 61 + 270_000), "00:01:01:010");
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(iso_639_1("eng"), "en");
        assert_eq!(iso_639_1("FRE"), "fr");
        assert_eq!(iso_639_1("srp"), "sr");
        assert_eq!(iso_639_1("xyz"), "  ");
        assert_eq!(iso_639_1("en"), "  ");
        assert!(LANGUAGES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_format_names() {
        assert_eq!("SRT".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::Srt);
        assert_eq!("idx".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::VobSub);
        assert_matches!("usf".parse::<SubtitleFormat>(), Err(Error::Unsupported(_)));
        assert_matches!("txt".parse::<SubtitleFormat>(), Err(Error::Format(_)));
    }
}
