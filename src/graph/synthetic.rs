//! Random composition graphs for demos and tests.
//!
//! Every element node is bonded to every element in the crystal, itself
//! included, so each atom owns at least one bond. Weights are random
//! fractional abundances summing to 1 within each crystal.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::Result;
use crate::graph::batch::{collate, CrystalGraph, CrystalGraphBatch};

/// One fully connected crystal with `n_elements` atoms.
pub fn random_crystal<R: Rng + ?Sized>(
    rng: &mut R,
    n_elements: usize,
    orig_atom_fea_len: usize,
    nbr_fea_len: usize,
) -> CrystalGraph {
    let raw: Vec<f32> = (0..n_elements).map(|_| rng.gen_range(0.05f32..1.0)).collect();
    let total: f32 = raw.iter().sum();
    let atom_weights = Array1::from_iter(raw.into_iter().map(|w| w / total));

    let atom_fea = Array2::from_shape_fn((n_elements, orig_atom_fea_len), |_| {
        rng.sample::<f32, _>(StandardNormal)
    });

    let n_bonds = n_elements * n_elements;
    let mut self_fea_idx = Vec::with_capacity(n_bonds);
    let mut nbr_fea_idx = Vec::with_capacity(n_bonds);
    for i in 0..n_elements {
        for k in 0..n_elements {
            self_fea_idx.push(i);
            nbr_fea_idx.push(k);
        }
    }
    let nbr_fea = Array2::from_shape_fn((n_bonds, nbr_fea_len), |_| {
        rng.sample::<f32, _>(StandardNormal)
    });

    CrystalGraph {
        atom_weights,
        atom_fea,
        nbr_fea,
        self_fea_idx,
        nbr_fea_idx,
    }
}

/// A collated batch of `n_crystals` random crystals with 1..=`max_elements` atoms each.
pub fn random_batch<R: Rng + ?Sized>(
    rng: &mut R,
    n_crystals: usize,
    max_elements: usize,
    orig_atom_fea_len: usize,
    nbr_fea_len: usize,
) -> Result<CrystalGraphBatch> {
    let max_elements = max_elements.max(1);
    let graphs: Vec<CrystalGraph> = (0..n_crystals)
        .map(|_| {
            let n = rng.gen_range(1..=max_elements);
            random_crystal(&mut *rng, n, orig_atom_fea_len, nbr_fea_len)
        })
        .collect();
    collate(&graphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_crystal_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let g = random_crystal(&mut rng, 4, 10, 5);
        assert_eq!(g.n_atoms(), 4);
        assert_eq!(g.n_bonds(), 16);
        assert_eq!(g.atom_fea.dim(), (4, 10));
        assert_eq!(g.nbr_fea.dim(), (16, 5));
        assert!((g.atom_weights.sum() - 1.0).abs() < 1e-5);
        assert!(g.atom_weights.iter().all(|&w| w > 0.0));
    }

    #[test]
    fn test_random_batch_is_valid() {
        let mut rng = StdRng::seed_from_u64(11);
        let batch = random_batch(&mut rng, 6, 5, 8, 3).unwrap();
        assert_eq!(batch.n_crystals(), 6);
        assert_eq!(batch.cross_crystal_bonds(), 0);
        assert_eq!(batch.bond_segments().empty_segments(), 0);
        assert_eq!(batch.crystal_segments().empty_segments(), 0);
    }

    #[test]
    fn test_random_batch_seeded() {
        let a = random_batch(&mut StdRng::seed_from_u64(5), 3, 4, 6, 2).unwrap();
        let b = random_batch(&mut StdRng::seed_from_u64(5), 3, 4, 6, 2).unwrap();
        assert_eq!(a.atom_fea(), b.atom_fea());
        assert_eq!(a.self_fea_idx(), b.self_fea_idx());
    }
}
