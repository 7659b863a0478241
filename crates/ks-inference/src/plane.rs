//! ABCD region-plane definition and flat indexing.
//!
//! A method is a list of *planes* (typically MET bins), each holding an
//! ordered list of *bins* (typically Njets/Nb bins), each split into the four
//! ABCD *quadrants*. Yields live in one flat vector per process; the layout is
//!
//! ```text
//! for plane in planes:
//!     for quadrant in [R1, R2, R3, R4]:
//!         for bin in 0..arity(plane, quadrant):
//!             row
//! ```
//!
//! With bin integration on (`int_nbnj`), R1 and R3 have arity 1: a single
//! bin-inclusive row per plane that every bin of that quadrant resolves to.

use ks_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four ABCD quadrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quadrant {
    /// Low in both discriminants.
    R1,
    /// High in the first discriminant only.
    R2,
    /// Low in the first, high in the second (`D3` in dilepton validation).
    R3,
    /// Signal-like region, predicted from the other three.
    R4,
}

impl Quadrant {
    /// All quadrants in row order.
    pub const ALL: [Quadrant; 4] = [Quadrant::R1, Quadrant::R2, Quadrant::R3, Quadrant::R4];

    /// Position in [`Quadrant::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`Quadrant::index`].
    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    /// R1 and R3 can be integrated over bins.
    pub fn is_integrable(self) -> bool {
        matches!(self, Quadrant::R1 | Quadrant::R3)
    }

    /// Display label; the upper quadrants use `rd_letter` (`R` or `D`).
    pub fn label(self, rd_letter: char) -> String {
        match self {
            Quadrant::R1 => "R1".to_string(),
            Quadrant::R2 => "R2".to_string(),
            Quadrant::R3 => format!("{rd_letter}3"),
            Quadrant::R4 => format!("{rd_letter}4"),
        }
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label('R'))
    }
}

/// Decoded position of a flat row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RegionIndex {
    /// Plane index.
    pub plane: usize,
    /// Bin index (always 0 for integrated quadrants).
    pub bin: usize,
    /// Quadrant.
    pub quadrant: Quadrant,
}

/// Region-plane definition of one ABCD method.
///
/// Built once; the builder-style `with_*` methods are the only way to change it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbcdMethod {
    name: String,
    planes: Vec<String>,
    bins: Vec<Vec<String>>,
    quadrants: [String; 4],
    first_signal_bin: Option<usize>,
    int_nbnj: bool,
    split_leptons: bool,
    caption: String,
    title: String,
    rd_letter: char,
    #[serde(skip)]
    offsets: Vec<usize>,
}

impl AbcdMethod {
    /// Define a method with per-plane bin lists.
    ///
    /// `bins.len()` must equal `planes.len()`, every plane needs at least one
    /// bin, and exactly four quadrant cuts are required.
    pub fn new(
        name: impl Into<String>,
        planes: Vec<String>,
        bins: Vec<Vec<String>>,
        quadrants: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        if planes.is_empty() {
            return Err(Error::Validation(format!("method '{name}': no planes defined")));
        }
        if bins.len() != planes.len() {
            return Err(Error::Validation(format!(
                "method '{name}': {} planes but {} bin lists",
                planes.len(),
                bins.len()
            )));
        }
        if let Some(p) = bins.iter().position(Vec::is_empty) {
            return Err(Error::Validation(format!("method '{name}': plane {p} has no bins")));
        }
        let quadrants: [String; 4] = quadrants.try_into().map_err(|q: Vec<String>| {
            Error::Validation(format!("method '{name}': expected 4 ABCD cuts, got {}", q.len()))
        })?;

        let mut method = Self {
            title: name.clone(),
            name,
            planes,
            bins,
            quadrants,
            first_signal_bin: None,
            int_nbnj: true,
            split_leptons: false,
            caption: String::new(),
            rd_letter: 'R',
            offsets: Vec::new(),
        };
        method.rebuild_offsets();
        Ok(method)
    }

    /// Define a method where every plane uses the same bins.
    pub fn with_shared_bins(
        name: impl Into<String>,
        planes: Vec<String>,
        bins: Vec<String>,
        quadrants: Vec<String>,
    ) -> Result<Self> {
        let per_plane = vec![bins; planes.len()];
        Self::new(name, planes, per_plane, quadrants)
    }

    /// First plane that belongs to the (blinded) signal region, or `None`.
    pub fn with_first_signal_bin(mut self, first: Option<usize>) -> Result<Self> {
        if let Some(f) = first {
            if f >= self.planes.len() {
                return Err(Error::Validation(format!(
                    "method '{}': first signal plane {} out of range ({} planes)",
                    self.name,
                    f,
                    self.planes.len()
                )));
            }
        }
        self.first_signal_bin = first;
        Ok(self)
    }

    /// Toggle integration of R1/R3 over bins.
    pub fn with_int_nbnj(mut self, int_nbnj: bool) -> Self {
        self.int_nbnj = int_nbnj;
        self.rebuild_offsets();
        self
    }

    /// Mark the method as split by lepton flavor.
    pub fn with_split_leptons(mut self, split: bool) -> Self {
        self.split_leptons = split;
        self
    }

    /// Report caption.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    /// Report title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Letter used for the upper quadrants (`R` single-lepton, `D` dilepton).
    pub fn with_rd_letter(mut self, letter: char) -> Self {
        self.rd_letter = letter;
        self
    }

    fn rebuild_offsets(&mut self) {
        let mut offsets = Vec::with_capacity(self.planes.len() + 1);
        let mut acc = 0;
        offsets.push(acc);
        for plane in 0..self.planes.len() {
            acc += Quadrant::ALL.iter().map(|&q| self.arity(plane, q)).sum::<usize>();
            offsets.push(acc);
        }
        self.offsets = offsets;
    }

    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plane cut labels.
    pub fn planes(&self) -> &[String] {
        &self.planes
    }

    /// Bin cut labels of one plane.
    pub fn bins(&self, plane: usize) -> &[String] {
        self.bins.get(plane).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The four quadrant cut labels.
    pub fn quadrant_cuts(&self) -> &[String; 4] {
        &self.quadrants
    }

    /// Report caption.
    pub fn caption(&self) -> &str {
        &self.caption
    }

    /// Report title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Letter used for the upper quadrants.
    pub fn rd_letter(&self) -> char {
        self.rd_letter
    }

    /// Whether R1/R3 are integrated over bins.
    pub fn int_nbnj(&self) -> bool {
        self.int_nbnj
    }

    /// Whether the method is split by lepton flavor.
    pub fn split_leptons(&self) -> bool {
        self.split_leptons
    }

    /// First signal plane, if any.
    pub fn first_signal_bin(&self) -> Option<usize> {
        self.first_signal_bin
    }

    /// Number of planes.
    pub fn n_planes(&self) -> usize {
        self.planes.len()
    }

    /// Number of bins declared in `plane` (0 when out of range).
    pub fn n_bins(&self, plane: usize) -> usize {
        self.bins.get(plane).map_or(0, Vec::len)
    }

    /// Rows materialized for `(plane, quadrant)`.
    pub fn arity(&self, plane: usize, quadrant: Quadrant) -> usize {
        if self.int_nbnj && quadrant.is_integrable() { 1 } else { self.n_bins(plane) }
    }

    /// Total number of flat rows.
    pub fn total_rows(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Flat rows belonging to `plane`, each exactly once.
    pub fn plane_rows(&self, plane: usize) -> std::ops::Range<usize> {
        match (self.offsets.get(plane), self.offsets.get(plane + 1)) {
            (Some(&a), Some(&b)) => a..b,
            _ => 0..0,
        }
    }

    /// Whether `plane` is part of the blinded signal region.
    pub fn is_signal_plane(&self, plane: usize) -> bool {
        self.first_signal_bin.is_some_and(|f| plane >= f)
    }

    /// Flat row of `(plane, bin, quadrant)`.
    ///
    /// For integrated quadrants every declared bin maps onto the inclusive row.
    pub fn index_bin(&self, plane: usize, bin: usize, quadrant: Quadrant) -> Result<usize> {
        if plane >= self.n_planes() {
            return Err(Error::Validation(format!(
                "method '{}': plane {} out of range ({} planes)",
                self.name,
                plane,
                self.n_planes()
            )));
        }
        let n_bins = self.n_bins(plane);
        if bin >= n_bins {
            return Err(Error::Validation(format!(
                "method '{}': bin {} out of range ({} bins in plane {})",
                self.name, bin, n_bins, plane
            )));
        }
        let before: usize = Quadrant::ALL[..quadrant.index()].iter().map(|&q| self.arity(plane, q)).sum();
        let within = if self.arity(plane, quadrant) == 1 { 0 } else { bin };
        Ok(self.offsets[plane] + before + within)
    }

    /// Inverse of [`AbcdMethod::index_bin`].
    pub fn decode(&self, index: usize) -> Result<RegionIndex> {
        if index >= self.total_rows() {
            return Err(Error::Validation(format!(
                "method '{}': row {} out of range ({} rows)",
                self.name,
                index,
                self.total_rows()
            )));
        }
        // offsets is strictly increasing because every plane has at least one row.
        let plane = self.offsets.partition_point(|&o| o <= index) - 1;
        let mut rest = index - self.offsets[plane];
        for q in Quadrant::ALL {
            let a = self.arity(plane, q);
            if rest < a {
                return Ok(RegionIndex { plane, bin: rest, quadrant: q });
            }
            rest -= a;
        }
        Err(Error::Computation(format!("row {index} could not be decoded")))
    }

    /// All rows in flat order.
    pub fn regions(&self) -> impl Iterator<Item = RegionIndex> + '_ {
        (0..self.n_planes()).flat_map(move |plane| {
            Quadrant::ALL.into_iter().flat_map(move |quadrant| {
                (0..self.arity(plane, quadrant)).map(move |bin| RegionIndex { plane, bin, quadrant })
            })
        })
    }

    /// Human-readable label of a flat row, e.g. `met>500 | njets>=9 | R4`.
    pub fn region_label(&self, index: usize) -> Result<String> {
        let r = self.decode(index)?;
        let bin_label = if self.arity(r.plane, r.quadrant) == 1 && self.n_bins(r.plane) > 1 {
            "all bins".to_string()
        } else {
            self.bins[r.plane][r.bin].clone()
        };
        Ok(format!(
            "{} | {} | {}",
            self.planes[r.plane],
            bin_label,
            r.quadrant.label(self.rd_letter)
        ))
    }

    /// Full selection of a flat row: plane, bin (unless integrated) and quadrant cuts joined by `&&`.
    pub fn region_cut(&self, index: usize) -> Result<String> {
        let r = self.decode(index)?;
        let mut parts = vec![self.planes[r.plane].as_str()];
        if self.arity(r.plane, r.quadrant) > 1 || self.n_bins(r.plane) == 1 {
            parts.push(self.bins[r.plane][r.bin].as_str());
        }
        parts.push(self.quadrants[r.quadrant.index()].as_str());
        Ok(parts.join(" && "))
    }
}
