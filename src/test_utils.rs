//! Fixtures for tests: tiny FITS maskbit images and scratch directories.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

const BLOCK: usize = 2880;
const CARD: usize = 80;

/// Fresh scratch directory under the system temp dir, unique per test and process.
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("brickmask_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn card(key: &str, value: &str) -> String {
    let mut c = format!("{key:<8}= {value:>20}");
    c.truncate(CARD);
    format!("{c:<80}")
}

fn string_card(key: &str, value: &str) -> String {
    let quoted = format!("'{value:<8}'");
    let c = format!("{key:<8}= {quoted:<20}");
    format!("{c:<80}")
}

fn float(v: f64) -> String {
    format!("{v:.12E}")
}

fn pad_block(buf: &mut Vec<u8>, fill: u8) {
    let rem = buf.len() % BLOCK;
    if rem != 0 {
        buf.resize(buf.len() + BLOCK - rem, fill);
    }
}

/// A rectangular maskbit image with a TAN projection.
#[derive(Debug, Clone)]
pub(crate) struct MaskFixture {
    pub bitpix: i64,
    pub width: usize,
    pub height: usize,
    /// Row-major, `pixels[x + y * width]`.
    pub pixels: Vec<u64>,
    pub ctype: [String; 2],
    pub crval: [f64; 2],
    pub crpix: [f64; 2],
    pub cd: [[f64; 2]; 2],
    pub extra: Vec<(String, String)>,
    pub gzip: bool,
    pub extension: bool,
}

impl MaskFixture {
    /// `size` x `size` image centred on `center` with `scale` degrees per
    /// pixel, RA increasing to the left.
    pub fn centred(center: [f64; 2], size: usize, scale: f64) -> Self {
        let mid = (size as f64 + 1.0) / 2.0;
        Self {
            bitpix: 8,
            width: size,
            height: size,
            pixels: vec![0; size * size],
            ctype: ["RA---TAN".into(), "DEC--TAN".into()],
            crval: center,
            crpix: [mid, mid],
            cd: [[-scale, 0.0], [0.0, scale]],
            extra: Vec::new(),
            gzip: false,
            extension: false,
        }
    }

    pub fn bitpix(mut self, bitpix: i64) -> Self {
        self.bitpix = bitpix;
        self
    }

    pub fn fill(mut self, value: u64) -> Self {
        self.pixels.iter_mut().for_each(|p| *p = value);
        self
    }

    pub fn set(mut self, x: usize, y: usize, value: u64) -> Self {
        self.pixels[x + y * self.width] = value;
        self
    }

    pub fn card(mut self, key: &str, value: &str) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub fn gzip(mut self) -> Self {
        self.gzip = true;
        self
    }

    pub fn in_extension(mut self) -> Self {
        self.extension = true;
        self
    }

    fn header(&self, first: &str, image: bool) -> Vec<u8> {
        let mut cards = vec![first.to_string()];
        if image {
            cards.push(card("BITPIX", &self.bitpix.to_string()));
            cards.push(card("NAXIS", "2"));
            cards.push(card("NAXIS1", &self.width.to_string()));
            cards.push(card("NAXIS2", &self.height.to_string()));
            if self.extension {
                cards.push(card("PCOUNT", "0"));
                cards.push(card("GCOUNT", "1"));
            }
            cards.push(string_card("CTYPE1", &self.ctype[0]));
            cards.push(string_card("CTYPE2", &self.ctype[1]));
            cards.push(card("CRVAL1", &float(self.crval[0])));
            cards.push(card("CRVAL2", &float(self.crval[1])));
            cards.push(card("CRPIX1", &float(self.crpix[0])));
            cards.push(card("CRPIX2", &float(self.crpix[1])));
            cards.push(card("CD1_1", &float(self.cd[0][0])));
            cards.push(card("CD1_2", &float(self.cd[0][1])));
            cards.push(card("CD2_1", &float(self.cd[1][0])));
            cards.push(card("CD2_2", &float(self.cd[1][1])));
            for (k, v) in &self.extra {
                cards.push(card(k, v));
            }
        } else {
            cards.push(card("BITPIX", "8"));
            cards.push(card("NAXIS", "0"));
            cards.push(card("EXTEND", "T"));
        }
        cards.push(format!("{:<80}", "END"));

        let mut buf = cards.concat().into_bytes();
        pad_block(&mut buf, b' ');
        buf
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        if self.extension {
            buf.extend(self.header(&card("SIMPLE", "T"), false));
            buf.extend(self.header(&string_card("XTENSION", "IMAGE"), true));
        } else {
            buf.extend(self.header(&card("SIMPLE", "T"), true));
        }

        let nbytes = (self.bitpix.unsigned_abs() / 8) as usize;
        for &p in &self.pixels {
            buf.extend_from_slice(&p.to_be_bytes()[8 - nbytes..]);
        }
        pad_block(&mut buf, 0);
        buf
    }

    pub fn write(&self, path: &Path) {
        write_bytes(path, &self.to_bytes(), self.gzip);
    }
}

fn write_bytes(path: &Path, bytes: &[u8], gzip: bool) {
    let mut file = File::create(path).unwrap();
    if gzip {
        let mut enc = GzEncoder::new(file, Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap();
    } else {
        file.write_all(bytes).unwrap();
    }
}

/// A `survey-bricks` style binary table in the first extension, with a
/// leading `BRICKID` column ahead of the ones the reader uses.
#[derive(Debug, Clone)]
pub(crate) struct BrickTableFixture {
    /// Brick name, `[ra1, ra2, dec1, dec2]` and `PHOTSYS`.
    pub rows: Vec<(String, [f64; 4], char)>,
    /// `TTYPE` values of the name, bound and region columns.
    pub columns: [String; 6],
    pub region: bool,
    pub single_precision: bool,
    pub gzip: bool,
}

impl BrickTableFixture {
    pub fn new() -> Self {
        let columns = ["BRICKNAME", "RA1", "RA2", "DEC1", "DEC2", "PHOTSYS"];
        Self {
            rows: Vec::new(),
            columns: columns.map(String::from),
            region: true,
            single_precision: false,
            gzip: false,
        }
    }

    pub fn row(mut self, name: &str, bounds: [f64; 4], photsys: char) -> Self {
        self.rows.push((name.into(), bounds, photsys));
        self
    }

    pub fn lowercase_columns(mut self) -> Self {
        self.columns.iter_mut().for_each(|c| *c = c.to_lowercase());
        self
    }

    pub fn without_region(mut self) -> Self {
        self.region = false;
        self
    }

    pub fn single_precision(mut self) -> Self {
        self.single_precision = true;
        self
    }

    pub fn rename(mut self, column: usize, name: &str) -> Self {
        self.columns[column] = name.into();
        self
    }

    pub fn gzip(mut self) -> Self {
        self.gzip = true;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let real = if self.single_precision { ("1E", 4) } else { ("1D", 8) };
        let mut fields = vec![("BRICKID".to_string(), "1J", 4), (self.columns[0].clone(), "8A", 8)];
        for name in &self.columns[1..5] {
            fields.push((name.clone(), real.0, real.1));
        }
        if self.region {
            fields.push((self.columns[5].clone(), "1A", 1));
        }
        let row_len: usize = fields.iter().map(|f| f.2).sum();

        let primary = [card("SIMPLE", "T"), card("BITPIX", "8"), card("NAXIS", "0"), card("EXTEND", "T")];
        let mut buf = primary.concat().into_bytes();
        buf.extend(format!("{:<80}", "END").bytes());
        pad_block(&mut buf, b' ');

        let mut cards = vec![
            string_card("XTENSION", "BINTABLE"),
            card("BITPIX", "8"),
            card("NAXIS", "2"),
            card("NAXIS1", &row_len.to_string()),
            card("NAXIS2", &self.rows.len().to_string()),
            card("PCOUNT", "0"),
            card("GCOUNT", "1"),
            card("TFIELDS", &fields.len().to_string()),
        ];
        for (i, (name, form, _)) in fields.iter().enumerate() {
            cards.push(string_card(&format!("TTYPE{}", i + 1), name));
            cards.push(string_card(&format!("TFORM{}", i + 1), form));
        }
        cards.push(string_card("EXTNAME", "BRICKS"));
        cards.push(format!("{:<80}", "END"));
        buf.extend(cards.concat().into_bytes());
        pad_block(&mut buf, b' ');

        for (id, (name, bounds, photsys)) in self.rows.iter().enumerate() {
            buf.extend_from_slice(&(id as i32 + 1).to_be_bytes());
            let mut text = name.clone().into_bytes();
            text.resize(8, b' ');
            buf.extend_from_slice(&text);
            for &b in bounds {
                if self.single_precision {
                    buf.extend_from_slice(&(b as f32).to_be_bytes());
                } else {
                    buf.extend_from_slice(&b.to_be_bytes());
                }
            }
            if self.region {
                buf.push(*photsys as u8);
            }
        }
        pad_block(&mut buf, 0);
        buf
    }

    pub fn write(&self, path: &Path) {
        write_bytes(path, &self.to_bytes(), self.gzip);
    }
}

#[test]
fn fixture_layout_is_block_aligned() {
    let fx = MaskFixture::centred([10.0, 20.0], 5, 0.01).bitpix(16).set(1, 2, 513);
    let bytes = fx.to_bytes();
    assert_eq!(bytes.len(), 2 * BLOCK);
    assert!(bytes.starts_with(b"SIMPLE  =                    T"));
    let data = &bytes[BLOCK..];
    let at = 2 * (1 + 2 * 5);
    assert_eq!(&data[at..at + 2], &[2, 1]);
}
