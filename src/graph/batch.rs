//! Batched crystal graphs.
//!
//! Atoms of several crystals are concatenated into one atom matrix; bonds
//! index into it. A [`CrystalGraphBatch`] is validated once at construction
//! and carries the two segment indices the network reduces over:
//! bonds → owner atom and atoms → crystal.

use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{ensure_len, Result, SampnnError};
use crate::kernels::segment::SegmentIndex;

/// A single crystal's composition graph with crystal-local indices.
#[derive(Clone, Debug)]
pub struct CrystalGraph {
    /// Per-atom importance weights (e.g. fractional abundance).
    pub atom_weights: Array1<f32>,

    /// Raw per-atom features: [n_atoms, orig_atom_fea_len]
    pub atom_fea: Array2<f32>,

    /// Per-bond features: [n_bonds, nbr_fea_len]
    pub nbr_fea: Array2<f32>,

    /// Owner atom of every bond.
    pub self_fea_idx: Vec<usize>,

    /// Neighbour atom of every bond.
    pub nbr_fea_idx: Vec<usize>,
}

impl CrystalGraph {
    pub fn n_atoms(&self) -> usize {
        self.atom_fea.nrows()
    }

    pub fn n_bonds(&self) -> usize {
        self.nbr_fea.nrows()
    }
}

/// Validated mini-batch of crystal graphs.
#[derive(Clone, Debug)]
pub struct CrystalGraphBatch {
    atom_weights: Array1<f32>,
    atom_fea: Array2<f32>,
    nbr_fea: Array2<f32>,
    nbr_fea_idx: Vec<usize>,

    /// Bonds grouped by owner atom (`self_fea_idx`).
    bond_segments: SegmentIndex,

    /// Atoms grouped by crystal (`crystal_atom_idx`).
    crystal_segments: SegmentIndex,
}

impl CrystalGraphBatch {
    /// Build a batch, checking every index and length invariant.
    ///
    /// `crystal_atom_idx[i]` is the crystal of atom row `i`, in `[0, n_crystals)`.
    pub fn new(
        atom_weights: Array1<f32>,
        atom_fea: Array2<f32>,
        nbr_fea: Array2<f32>,
        self_fea_idx: Vec<usize>,
        nbr_fea_idx: Vec<usize>,
        crystal_atom_idx: Vec<usize>,
        n_crystals: usize,
    ) -> Result<Self> {
        let n_atoms = atom_fea.nrows();
        ensure_len("atom weights", n_atoms, atom_weights.len())?;
        ensure_len("crystal_atom_idx", n_atoms, crystal_atom_idx.len())?;
        ensure_len("nbr_fea_idx vs self_fea_idx", self_fea_idx.len(), nbr_fea_idx.len())?;
        ensure_len("bond features", self_fea_idx.len(), nbr_fea.nrows())?;

        if let Some((row, &value)) = atom_weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(SampnnError::InvalidWeight { row, value });
        }
        if let Some(&bad) = nbr_fea_idx.iter().find(|&&k| k >= n_atoms) {
            return Err(SampnnError::IndexOutOfRange {
                context: "nbr_fea_idx",
                index: bad,
                bound: n_atoms,
            });
        }

        let bond_segments = SegmentIndex::new(self_fea_idx, n_atoms)?;
        let crystal_segments = SegmentIndex::new(crystal_atom_idx, n_crystals)?;

        let empty = crystal_segments.empty_segments();
        if empty > 0 {
            tracing::warn!(empty, n_crystals, "batch contains crystals without atoms");
        }
        tracing::debug!(
            atoms = n_atoms,
            bonds = nbr_fea_idx.len(),
            crystals = n_crystals,
            "crystal graph batch"
        );

        Ok(Self {
            atom_weights,
            atom_fea,
            nbr_fea,
            nbr_fea_idx,
            bond_segments,
            crystal_segments,
        })
    }

    pub fn n_atoms(&self) -> usize {
        self.atom_fea.nrows()
    }

    pub fn n_bonds(&self) -> usize {
        self.nbr_fea_idx.len()
    }

    pub fn n_crystals(&self) -> usize {
        self.crystal_segments.num_segments()
    }

    pub fn orig_atom_fea_len(&self) -> usize {
        self.atom_fea.ncols()
    }

    pub fn nbr_fea_len(&self) -> usize {
        self.nbr_fea.ncols()
    }

    pub fn atom_weights(&self) -> &Array1<f32> {
        &self.atom_weights
    }

    pub fn atom_fea(&self) -> &Array2<f32> {
        &self.atom_fea
    }

    pub fn nbr_fea(&self) -> &Array2<f32> {
        &self.nbr_fea
    }

    pub fn self_fea_idx(&self) -> &[usize] {
        self.bond_segments.ids()
    }

    pub fn nbr_fea_idx(&self) -> &[usize] {
        &self.nbr_fea_idx
    }

    pub fn crystal_atom_idx(&self) -> &[usize] {
        self.crystal_segments.ids()
    }

    pub fn bond_segments(&self) -> &SegmentIndex {
        &self.bond_segments
    }

    pub fn crystal_segments(&self) -> &SegmentIndex {
        &self.crystal_segments
    }

    /// Bonds whose owner and neighbour sit in different crystals.
    pub fn cross_crystal_bonds(&self) -> usize {
        let crystal = self.crystal_segments.ids();
        self.bond_segments
            .ids()
            .iter()
            .zip(self.nbr_fea_idx.iter())
            .filter(|&(&i, &k)| crystal[i] != crystal[k])
            .count()
    }

    /// Copy of this batch with the atom features of `atoms` replaced.
    pub fn with_atom_rows(&self, atoms: &[usize], rows: ArrayView2<f32>) -> Result<Self> {
        ensure_len("replacement rows", atoms.len(), rows.nrows())?;
        let mut out = self.clone();
        for (&a, row) in atoms.iter().zip(rows.rows()) {
            if a >= out.n_atoms() {
                return Err(SampnnError::IndexOutOfRange {
                    context: "replacement atom",
                    index: a,
                    bound: out.n_atoms(),
                });
            }
            ensure_len("replacement width", out.atom_fea.ncols(), row.len())?;
            out.atom_fea.row_mut(a).assign(&row);
        }
        Ok(out)
    }
}

/// Concatenate crystal graphs into one batch, offsetting bond indices.
pub fn collate(graphs: &[CrystalGraph]) -> Result<CrystalGraphBatch> {
    if graphs.is_empty() {
        return Err(SampnnError::EmptyBatch("collate needs at least one crystal"));
    }

    let n_atoms: usize = graphs.iter().map(|g| g.n_atoms()).sum();
    let n_bonds: usize = graphs.iter().map(|g| g.n_bonds()).sum();

    let mut self_fea_idx = Vec::with_capacity(n_bonds);
    let mut nbr_fea_idx = Vec::with_capacity(n_bonds);
    let mut crystal_atom_idx = Vec::with_capacity(n_atoms);
    let mut offset = 0;

    for (crystal, g) in graphs.iter().enumerate() {
        let local = g.n_atoms();
        ensure_len("crystal atom weights", local, g.atom_weights.len())?;
        ensure_len("crystal bond indices", g.self_fea_idx.len(), g.nbr_fea_idx.len())?;
        ensure_len("crystal bond features", g.self_fea_idx.len(), g.n_bonds())?;

        for (&i, &k) in g.self_fea_idx.iter().zip(g.nbr_fea_idx.iter()) {
            let bad = if i >= local { Some(i) } else if k >= local { Some(k) } else { None };
            if let Some(index) = bad {
                return Err(SampnnError::IndexOutOfRange {
                    context: "crystal-local bond index",
                    index,
                    bound: local,
                });
            }
            self_fea_idx.push(i + offset);
            nbr_fea_idx.push(k + offset);
        }
        crystal_atom_idx.extend(std::iter::repeat(crystal).take(local));
        offset += local;
    }

    let weights: Vec<ArrayView1<f32>> = graphs.iter().map(|g| g.atom_weights.view()).collect();
    let atoms: Vec<ArrayView2<f32>> = graphs.iter().map(|g| g.atom_fea.view()).collect();
    let bonds: Vec<ArrayView2<f32>> = graphs.iter().map(|g| g.nbr_fea.view()).collect();

    CrystalGraphBatch::new(
        concatenate(Axis(0), &weights)?,
        concatenate(Axis(0), &atoms)?,
        concatenate(Axis(0), &bonds)?,
        self_fea_idx,
        nbr_fea_idx,
        crystal_atom_idx,
        graphs.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn pair() -> CrystalGraph {
        CrystalGraph {
            atom_weights: array![0.5, 0.5],
            atom_fea: array![[1.0, 0.0], [0.0, 1.0]],
            nbr_fea: array![[0.1], [0.2]],
            self_fea_idx: vec![0, 1],
            nbr_fea_idx: vec![1, 0],
        }
    }

    fn triple() -> CrystalGraph {
        CrystalGraph {
            atom_weights: array![0.2, 0.3, 0.5],
            atom_fea: array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]],
            nbr_fea: array![[0.3], [0.4], [0.5], [0.6]],
            self_fea_idx: vec![0, 1, 2, 2],
            nbr_fea_idx: vec![1, 2, 0, 1],
        }
    }

    #[test]
    fn test_collate_offsets() {
        let batch = collate(&[pair(), triple()]).unwrap();
        assert_eq!(batch.n_atoms(), 5);
        assert_eq!(batch.n_bonds(), 6);
        assert_eq!(batch.n_crystals(), 2);
        assert_eq!(batch.self_fea_idx(), &[0, 1, 2, 3, 4, 4]);
        assert_eq!(batch.nbr_fea_idx(), &[1, 0, 3, 4, 2, 3]);
        assert_eq!(batch.crystal_atom_idx(), &[0, 0, 1, 1, 1]);
        assert_eq!(batch.atom_fea().row(3).to_vec(), vec![2.0, 2.0]);
        assert_eq!(batch.nbr_fea()[[5, 0]], 0.6);
        assert_eq!(batch.cross_crystal_bonds(), 0);
    }

    #[test]
    fn test_collate_empty() {
        assert!(matches!(collate(&[]), Err(SampnnError::EmptyBatch(_))));
    }

    #[test]
    fn test_collate_rejects_local_overflow() {
        let mut g = pair();
        g.nbr_fea_idx = vec![1, 2];
        assert!(matches!(
            collate(&[g, triple()]),
            Err(SampnnError::IndexOutOfRange { index: 2, bound: 2, .. })
        ));
    }

    #[test]
    fn test_collate_width_mismatch() {
        let mut g = triple();
        g.atom_fea = Array2::zeros((3, 5));
        assert!(matches!(
            collate(&[pair(), g]),
            Err(SampnnError::Shape(_))
        ));
    }

    #[test]
    fn test_new_validates_lengths() {
        let err = CrystalGraphBatch::new(
            array![1.0, 1.0],
            Array2::zeros((2, 3)),
            Array2::zeros((2, 1)),
            vec![0, 1],
            vec![1],
            vec![0, 0],
            1,
        )
        .unwrap_err();
        assert!(matches!(err, SampnnError::LengthMismatch { .. }));
    }

    #[test]
    fn test_new_validates_indices() {
        let err = CrystalGraphBatch::new(
            array![1.0, 1.0],
            Array2::zeros((2, 3)),
            Array2::zeros((2, 1)),
            vec![0, 2],
            vec![1, 0],
            vec![0, 0],
            1,
        )
        .unwrap_err();
        assert!(matches!(err, SampnnError::IndexOutOfRange { index: 2, .. }));

        let err = CrystalGraphBatch::new(
            array![1.0, 1.0],
            Array2::zeros((2, 3)),
            Array2::zeros((2, 1)),
            vec![0, 1],
            vec![1, 0],
            vec![0, 1],
            1,
        )
        .unwrap_err();
        assert!(matches!(err, SampnnError::IndexOutOfRange { index: 1, bound: 1, .. }));
    }

    #[test]
    fn test_new_rejects_negative_weight() {
        let err = CrystalGraphBatch::new(
            array![1.0, -0.1],
            Array2::zeros((2, 3)),
            Array2::zeros((0, 1)),
            vec![],
            vec![],
            vec![0, 0],
            1,
        )
        .unwrap_err();
        assert!(matches!(err, SampnnError::InvalidWeight { row: 1, .. }));
    }

    #[test]
    fn test_cross_crystal_bonds_counted() {
        let batch = CrystalGraphBatch::new(
            array![1.0, 1.0],
            Array2::zeros((2, 1)),
            Array2::zeros((2, 1)),
            vec![0, 1],
            vec![1, 0],
            vec![0, 1],
            2,
        )
        .unwrap();
        assert_eq!(batch.cross_crystal_bonds(), 2);
    }

    #[test]
    fn test_with_atom_rows() {
        let batch = collate(&[pair(), triple()]).unwrap();
        let changed = batch
            .with_atom_rows(&[2, 4], array![[9.0, 9.0], [8.0, 8.0]].view())
            .unwrap();
        assert_eq!(changed.atom_fea().row(2).to_vec(), vec![9.0, 9.0]);
        assert_eq!(changed.atom_fea().row(0), batch.atom_fea().row(0));
        assert!(batch
            .with_atom_rows(&[5], array![[0.0, 0.0]].view())
            .is_err());
    }
}
