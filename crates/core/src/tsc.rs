//! Binary TSCB tables of aspherical atomic form factors.
//!
//! Layout (all integers `i32`, little endian):
//!
//! ```text
//! header_len  labels_len
//! header      (ASCII "KEY: value" lines, without TITLE/SYMM/SCATTERERS)
//! labels      (ASCII, space separated scatterer labels)
//! n_refl
//! n_refl x { h k l, n_atoms x (re: f64, im: f64) }
//! ```
//!
//! A table can be built from the `_aspheric_ff` loop of a result CIF.

use std::collections::BTreeMap;

use crate::cif::{CifBlock, CifLoop};
use crate::error::CoreError;

const OMITTED_HEADER_KEYS: [&str; 3] = ["SCATTERERS", "TITLE", "SYMM"];

/// Tags a CIF block must carry to describe a form-factor table.
pub const REQUIRED_CIF_TAGS: [&str; 3] = [
    "_aspheric_ffs.source",
    "_aspheric_ffs_partitioning.name",
    "_aspheric_ffs_partitioning.software",
];

const SCATTERER_TAG: &str = "_wfn_moiety.asu_atom_site_label";

/// A complex form factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// Form factors of all scatterers for one reflection.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    pub hkl: [i32; 3],
    pub factors: Vec<Complex>,
}

/// In-memory TSCB table.
#[derive(Debug, Clone, PartialEq)]
pub struct TscbFile {
    pub header: BTreeMap<String, String>,
    pub scatterers: Vec<String>,
    pub reflections: Vec<Reflection>,
}

impl Default for TscbFile {
    fn default() -> Self {
        let mut header = BTreeMap::new();
        header.insert("TITLE".to_string(), "generic_tsc".to_string());
        header.insert("SYMM".to_string(), "expanded".to_string());
        Self {
            header,
            scatterers: Vec::new(),
            reflections: Vec::new(),
        }
    }
}

/// Parse `KEY: value` header lines. Lines without a key continue the
/// previous entry.
pub fn parse_header(text: &str) -> Result<BTreeMap<String, String>, CoreError> {
    let mut header = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in text.trim().lines() {
        match line.split_once(':') {
            Some((key, value)) => {
                if let Some((k, v)) = current.take() {
                    header.insert(k, v);
                }
                current = Some((key.trim().to_string(), value.trim().to_string()));
            }
            None => match current.as_mut() {
                Some((_, v)) => {
                    v.push('\n');
                    v.push_str(line);
                }
                None => {
                    return Err(CoreError::Tscb(format!("malformed header line: {line}")));
                }
            },
        }
    }
    if let Some((k, v)) = current {
        header.insert(k, v);
    }
    Ok(header)
}

/// Parse one `[v1 v2 ...]` cell of a form-factor column.
fn parse_bracketed(cell: &str) -> Result<Vec<f64>, CoreError> {
    cell.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split_whitespace()
        .map(|v| {
            v.parse::<f64>()
                .map_err(|_| CoreError::Tscb(format!("invalid form factor value '{v}'")))
        })
        .collect()
}

fn required_column<'a>(
    lp: &'a CifLoop,
    tag: &str,
) -> Result<Vec<&'a str>, CoreError> {
    lp.column(tag)
        .ok_or_else(|| CoreError::Tscb(format!("missing column {tag}")))
}

impl TscbFile {
    /// Build a table from a CIF block carrying an `_aspheric_ff` loop.
    pub fn from_cif_block(block: &CifBlock) -> Result<Self, CoreError> {
        if let Some(missing) = REQUIRED_CIF_TAGS.iter().find(|t| !block.contains(t)) {
            return Err(CoreError::Tscb(format!(
                "CIF block does not contain required entry {missing}"
            )));
        }

        let scatterers: Vec<String> = match block.loop_with(SCATTERER_TAG) {
            Some(lp) => required_column(lp, SCATTERER_TAG)?
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => block
                .get(SCATTERER_TAG)
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        };
        if scatterers.is_empty() {
            return Err(CoreError::Tscb(format!("no scatterers in {SCATTERER_TAG}")));
        }

        let lp = block
            .loop_with("_aspheric_ff.index_h")
            .ok_or_else(|| CoreError::Tscb("missing loop _aspheric_ff".into()))?;

        let h = required_column(lp, "_aspheric_ff.index_h")?;
        let k = required_column(lp, "_aspheric_ff.index_k")?;
        let l = required_column(lp, "_aspheric_ff.index_l")?;
        let parse_index = |v: &str| {
            v.parse::<i32>()
                .map_err(|_| CoreError::Tscb(format!("invalid Miller index '{v}'")))
        };
        let hkls = h
            .iter()
            .zip(&k)
            .zip(&l)
            .map(|((h, k), l)| Ok([parse_index(*h)?, parse_index(*k)?, parse_index(*l)?]))
            .collect::<Result<Vec<_>, CoreError>>()?;

        let mut real = Vec::new();
        for cell in required_column(lp, "_aspheric_ff.form_factor_real")? {
            real.extend(parse_bracketed(cell)?);
        }
        let mut imag = Vec::new();
        for cell in required_column(lp, "_aspheric_ff.form_factor_imag")? {
            imag.extend(parse_bracketed(cell)?);
        }
        if real.len() != imag.len() {
            return Err(CoreError::Tscb(format!(
                "{} real but {} imaginary form factor values",
                real.len(),
                imag.len()
            )));
        }

        let n_atoms = scatterers.len();
        if real.len() % n_atoms != 0 {
            return Err(CoreError::Tscb(
                "number of form factor values is not a multiple of the number of scatterers"
                    .into(),
            ));
        }
        let factors: Vec<Complex> = real
            .into_iter()
            .zip(imag)
            .map(|(re, im)| Complex::new(re, im))
            .collect();
        if factors.len() / n_atoms != hkls.len() {
            return Err(CoreError::Tscb(format!(
                "{} Miller indices but {} form factor sets",
                hkls.len(),
                factors.len() / n_atoms
            )));
        }

        let reflections = hkls
            .into_iter()
            .zip(factors.chunks(n_atoms))
            .map(|(hkl, f)| Reflection {
                hkl,
                factors: f.to_vec(),
            })
            .collect();

        Ok(Self {
            scatterers,
            reflections,
            ..Default::default()
        })
    }

    /// Form factors of one scatterer, keyed by reflection.
    pub fn factors_for(&self, label: &str) -> Result<Vec<([i32; 3], Complex)>, CoreError> {
        let idx = self
            .scatterers
            .iter()
            .position(|s| s == label)
            .ok_or_else(|| CoreError::NotFound(format!("scatterer '{label}'")))?;
        Ok(self
            .reflections
            .iter()
            .map(|r| (r.hkl, r.factors[idx]))
            .collect())
    }

    fn header_string(&self) -> String {
        self.header
            .iter()
            .filter(|(k, _)| !OMITTED_HEADER_KEYS.contains(&k.as_str()))
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Encode the table.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let header = self.header_string();
        let labels = self.scatterers.join(" ");
        if !header.is_ascii() || !labels.is_ascii() {
            return Err(CoreError::Tscb("header and labels must be ASCII".into()));
        }
        let n_atoms = self.scatterers.len();
        if let Some(bad) = self.reflections.iter().find(|r| r.factors.len() != n_atoms) {
            return Err(CoreError::Tscb(format!(
                "reflection {:?} has {} factors for {n_atoms} scatterers",
                bad.hkl,
                bad.factors.len()
            )));
        }

        let len_i32 = |n: usize| {
            i32::try_from(n).map_err(|_| CoreError::Tscb(format!("section too large: {n}")))
        };

        let mut out = Vec::with_capacity(
            12 + header.len() + labels.len() + self.reflections.len() * (12 + 16 * n_atoms),
        );
        out.extend(len_i32(header.len())?.to_le_bytes());
        out.extend(len_i32(labels.len())?.to_le_bytes());
        out.extend(header.as_bytes());
        out.extend(labels.as_bytes());
        out.extend(len_i32(self.reflections.len())?.to_le_bytes());
        for r in &self.reflections {
            for i in r.hkl {
                out.extend(i.to_le_bytes());
            }
            for f in &r.factors {
                out.extend(f.re.to_le_bytes());
                out.extend(f.im.to_le_bytes());
            }
        }
        Ok(out)
    }

    /// Decode a table.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        let mut r = Reader { bytes, pos: 0 };
        let header_len = r.len()?;
        let labels_len = r.len()?;

        let mut file = Self::default();
        if header_len > 0 {
            let text = r.ascii(header_len)?;
            file.header.extend(parse_header(&text)?);
        }
        file.scatterers = r
            .ascii(labels_len)?
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let n_refl = r.len()?;
        let n_atoms = file.scatterers.len();
        for _ in 0..n_refl {
            let hkl = [r.i32()?, r.i32()?, r.i32()?];
            let factors = (0..n_atoms)
                .map(|_| Ok(Complex::new(r.f64()?, r.f64()?)))
                .collect::<Result<Vec<_>, CoreError>>()?;
            file.reflections.push(Reflection { hkl, factors });
        }
        if r.pos != bytes.len() {
            return Err(CoreError::Tscb(format!(
                "{} trailing byte(s)",
                bytes.len() - r.pos
            )));
        }
        Ok(file)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], CoreError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| CoreError::Tscb(format!("truncated at byte {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn i32(&mut self) -> Result<i32, CoreError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(buf))
    }

    fn f64(&mut self) -> Result<f64, CoreError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(buf))
    }

    fn len(&mut self) -> Result<usize, CoreError> {
        let n = self.i32()?;
        usize::try_from(n).map_err(|_| CoreError::Tscb(format!("negative length {n}")))
    }

    fn ascii(&mut self, n: usize) -> Result<String, CoreError> {
        let raw = self.take(n)?;
        if !raw.is_ascii() {
            return Err(CoreError::Tscb("non-ASCII text section".into()));
        }
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
