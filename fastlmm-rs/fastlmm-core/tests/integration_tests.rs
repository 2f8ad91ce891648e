//! End-to-end tests on synthetic PLINK filesets.
//!
//! Each test simulates genotypes and a phenotype with a known causal SNP,
//! writes them to a temporary directory and runs the same path as the CLI.

use std::path::Path;

use fastlmm_core::association::{single_snp_eigen, SingleSnpConfig, SnpResult};
use fastlmm_core::eigen::{eigen_from_kernel, eigen_from_snps, EigenData};
use fastlmm_core::kernel::KernelData;
use fastlmm_core::model::serialization::{load_model, save_model};
use fastlmm_core::model::{
    FastLmmModel, LinearRegressionModel, SavedModel, SnpMatrix, TestKernel, TrainKernel,
    TrainedModel,
};
use fastlmm_core::standardize::Unit;
use fastlmm_geno::phenotype::{read_pheno, write_pheno, PhenoTable};
use fastlmm_geno::plink::{write_plink, PlinkReader};
use fastlmm_geno::traits::{GenotypeReader, MarkerInfo};
use fastlmm_linalg::dense::DenseMatrix;
use rand::{Rng, SeedableRng};

const N: usize = 120;
const M: usize = 40;
const CAUSAL: usize = 7;

struct Simulated {
    ids: Vec<String>,
    markers: Vec<MarkerInfo>,
    g: DenseMatrix,
    y: Vec<f64>,
    age: Vec<f64>,
}

/// Genotypes at MAF 0.3 and y = 0.8 * g[CAUSAL] + 0.02 * age + noise.
fn simulate(seed: u64) -> Simulated {
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
    let mut g = DenseMatrix::zeros(N, M);
    for j in 0..M {
        for i in 0..N {
            let d = (0..2).filter(|_| rng.gen::<f64>() < 0.3).count();
            g.set(i, j, d as f64);
        }
    }
    let age: Vec<f64> = (0..N).map(|_| rng.gen_range(20.0..70.0)).collect();
    let y = (0..N)
        .map(|i| 0.8 * g.get(i, CAUSAL) + 0.02 * age[i] + rng.gen::<f64>() - 0.5)
        .collect();
    Simulated {
        ids: (0..N).map(|i| format!("ind{i}")).collect(),
        markers: (0..M)
            .map(|j| MarkerInfo {
                chrom: "1".into(),
                id: format!("rs{j}"),
                gen_dist: 0.0,
                pos: 1000 * (j as u64 + 1),
            })
            .collect(),
        g,
        y,
        age,
    }
}

fn write_inputs(sim: &Simulated, dir: &Path) -> (PhenoTable, PhenoTable) {
    write_plink(dir.join("geno"), &sim.ids, &sim.markers, &sim.g).unwrap();
    let pheno = PhenoTable::new(
        sim.ids.clone(),
        vec!["trait".into()],
        DenseMatrix::from_vec(&sim.y),
    )
    .unwrap();
    let covar = PhenoTable::new(
        sim.ids.clone(),
        vec!["age".into()],
        DenseMatrix::from_vec(&sim.age),
    )
    .unwrap();
    write_pheno(&dir.join("pheno.txt"), &pheno).unwrap();
    write_pheno(&dir.join("covar.txt"), &covar).unwrap();
    (read_pheno(&dir.join("pheno.txt")).unwrap(), read_pheno(&dir.join("covar.txt")).unwrap())
}

mod single_snp {
    use super::*;

    #[test]
    fn test_causal_snp_ranks_first() {
        let sim = simulate(11);
        let dir = tempfile::tempdir().unwrap();
        let (pheno, covar) = write_inputs(&sim, dir.path());

        let mut reader = PlinkReader::new(dir.path().join("geno")).unwrap();
        let (g, _) = reader.read_all().unwrap();
        let eigen = eigen_from_snps(reader.sample_ids(), &g).unwrap();

        let config = SingleSnpConfig {
            output_file: Some(dir.path().join("out").join("results.tsv")),
            batch_size: 16,
            ..SingleSnpConfig::default()
        };
        let results = single_snp_eigen(&mut reader, &pheno, &eigen, Some(&covar), &config).unwrap();

        assert_eq!(results.len(), M);
        assert_eq!(results[0].snp, format!("rs{CAUSAL}"));
        assert!(results[0].p_value < 1e-6, "p = {}", results[0].p_value);
        assert!(results[0].snp_weight > 0.0);
        assert!(results
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.p_value)));
        for w in results.windows(2) {
            assert!(w[0].p_value <= w[1].p_value);
        }

        let text = std::fs::read_to_string(dir.path().join("out").join("results.tsv")).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("sid_index\tSNP\tChr"));
        assert_eq!(lines.count(), M);
    }

    fn run_with(sim: &Simulated, dir: &Path, config: &SingleSnpConfig) -> Vec<SnpResult> {
        let (pheno, covar) = write_inputs(sim, dir);
        let mut reader = PlinkReader::new(dir.join("geno")).unwrap();
        let eigen = eigen_from_snps(&sim.ids, &sim.g).unwrap();
        single_snp_eigen(&mut reader, &pheno, &eigen, Some(&covar), config).unwrap()
    }

    #[test]
    fn test_reml_test_ranks_causal_first() {
        let sim = simulate(14);
        let dir = tempfile::tempdir().unwrap();
        let config = SingleSnpConfig {
            test_via_reml: true,
            ..SingleSnpConfig::default()
        };
        let results = run_with(&sim, dir.path(), &config);

        assert_eq!(results.len(), M);
        assert_eq!(results[0].snp, format!("rs{CAUSAL}"));
        assert!(results[0].p_value < 1e-6, "p = {}", results[0].p_value);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.p_value)));
        assert!(results.iter().all(|r| r.snp_weight_se.is_nan()));
    }

    #[test]
    fn test_ml_h2_search_ranks_causal_first() {
        let sim = simulate(15);
        let dir = tempfile::tempdir().unwrap();
        let config = SingleSnpConfig {
            fit_log_delta_via_reml: false,
            ..SingleSnpConfig::default()
        };
        let results = run_with(&sim, dir.path(), &config);

        assert_eq!(results[0].snp, format!("rs{CAUSAL}"));
        assert!(results[0].p_value < 1e-6, "p = {}", results[0].p_value);
        assert!(results.iter().all(|r| r.snp_weight_se.is_finite()));
        assert!(results.iter().all(|r| (0.0..1.0).contains(&r.null_h2)));
    }

    #[test]
    fn test_monomorphic_snps_do_not_stop_the_scan() {
        let mut sim = simulate(16);
        for i in 0..N {
            sim.g.set(i, 3, 1.0);
            sim.g.set(i, 5, 0.0);
        }
        for test_via_reml in [true, false] {
            let dir = tempfile::tempdir().unwrap();
            let config = SingleSnpConfig {
                test_via_reml,
                ..SingleSnpConfig::default()
            };
            let results = run_with(&sim, dir.path(), &config);

            assert_eq!(results.len(), M);
            assert_eq!(results[0].snp, format!("rs{CAUSAL}"));
            let tail: Vec<&str> = results[M - 2..].iter().map(|r| r.snp.as_str()).collect();
            assert!(tail.contains(&"rs3") && tail.contains(&"rs5"), "{tail:?}");
            assert!(results[M - 2..].iter().all(|r| r.p_value.is_nan()));
            assert!(results[..M - 2].iter().all(|r| (0.0..=1.0).contains(&r.p_value)));
        }
    }

    #[test]
    fn test_kernel_file_and_snp_eigen_agree() {
        let sim = simulate(12);
        let dir = tempfile::tempdir().unwrap();
        let (pheno, _) = write_inputs(&sim, dir.path());

        let mut std_g = sim.g.clone();
        Unit.train(&mut std_g);
        let from_kernel = eigen_from_kernel(&KernelData::from_snps(&sim.ids, &std_g).unwrap()).unwrap();
        let from_snps = eigen_from_snps(&sim.ids, &sim.g).unwrap();

        let config = SingleSnpConfig {
            log_delta: Some(0.5),
            ..SingleSnpConfig::default()
        };
        let mut reader = PlinkReader::new(dir.path().join("geno")).unwrap();
        let a = single_snp_eigen(&mut reader, &pheno, &from_kernel, None, &config).unwrap();
        let mut reader = PlinkReader::new(dir.path().join("geno")).unwrap();
        let b = single_snp_eigen(&mut reader, &pheno, &from_snps, None, &config).unwrap();

        for (ra, rb) in a.iter().zip(&b) {
            assert_eq!(ra.snp, rb.snp);
            assert!((ra.p_value - rb.p_value).abs() < 1e-6 * ra.p_value.max(1e-12) + 1e-12);
        }
    }

    #[test]
    fn test_eigen_file_round_trip_gives_same_results() {
        let sim = simulate(13);
        let dir = tempfile::tempdir().unwrap();
        let (pheno, covar) = write_inputs(&sim, dir.path());

        let eigen = eigen_from_snps(&sim.ids, &sim.g).unwrap();
        let path = dir.path().join("eigen.bin");
        eigen.save(&path).unwrap();
        let loaded = EigenData::load(&path).unwrap();

        let config = SingleSnpConfig::default();
        let mut reader = PlinkReader::new(dir.path().join("geno")).unwrap();
        let a = single_snp_eigen(&mut reader, &pheno, &eigen, Some(&covar), &config).unwrap();
        let mut reader = PlinkReader::new(dir.path().join("geno")).unwrap();
        let b = single_snp_eigen(&mut reader, &pheno, &loaded, Some(&covar), &config).unwrap();
        assert_eq!(a.len(), b.len());
        for (ra, rb) in a.iter().zip(&b) {
            assert_eq!(ra.sid_index, rb.sid_index);
            assert!((ra.p_value - rb.p_value).abs() <= 1e-10 * ra.p_value.max(1e-300));
        }
    }
}

mod prediction {
    use super::*;

    fn snps(sim: &Simulated, rows: &[usize]) -> SnpMatrix {
        SnpMatrix {
            sample_ids: rows.iter().map(|&i| sim.ids[i].clone()).collect(),
            sids: sim.markers.iter().map(|m| m.id.clone()).collect(),
            values: sim.g.select_rows(rows),
        }
    }

    #[test]
    fn test_learn_save_load_predict() {
        let sim = simulate(21);
        let dir = tempfile::tempdir().unwrap();
        let (pheno, covar) = write_inputs(&sim, dir.path());

        let train: Vec<usize> = (0..100).collect();
        let test: Vec<usize> = (100..N).collect();
        let model = FastLmmModel::learn(
            TrainKernel::Snps(snps(&sim, &train)),
            Some(&covar.take_rows(&train)),
            &pheno.take_rows(&train),
            None,
        )
        .unwrap();
        let saved: SavedModel = model.into();
        let path = dir.path().join("trait.model");
        save_model(&saved, &path).unwrap();
        let loaded = load_model(&path).unwrap();

        let pred = loaded
            .predict(TestKernel::Snps(snps(&sim, &test)), Some(&covar.take_rows(&test)))
            .unwrap();
        assert_eq!(pred.sample_ids.len(), test.len());
        assert_eq!(pred.pheno_name, "trait");
        assert_eq!(pred.covariance.nrows(), test.len());
        assert!(pred.values.iter().all(|v| v.is_finite()));

        // Beats predicting the training mean on held-out individuals
        let mean = sim.y[..100].iter().sum::<f64>() / 100.0;
        let mse_model: f64 = test
            .iter()
            .zip(&pred.values)
            .map(|(&i, p)| (sim.y[i] - p).powi(2))
            .sum();
        let mse_mean: f64 = test.iter().map(|&i| (sim.y[i] - mean).powi(2)).sum();
        assert!(mse_model < mse_mean, "{mse_model} vs {mse_mean}");

        let table = pred.to_table().unwrap();
        write_pheno(&dir.path().join("pred.txt"), &table).unwrap();
        let back = read_pheno(&dir.path().join("pred.txt")).unwrap();
        assert_eq!(back.names, vec!["trait"]);
        assert_eq!(back.sample_ids, pred.sample_ids);
    }

    #[test]
    fn test_linear_regression_baseline() {
        let sim = simulate(22);
        let dir = tempfile::tempdir().unwrap();
        let (pheno, covar) = write_inputs(&sim, dir.path());

        let model = LinearRegressionModel::learn(Some(&covar), &pheno).unwrap();
        let stats = model.stats();
        assert_eq!(stats.h2, 0.0);
        assert!(stats.r2 > 0.0 && stats.r2 < 1.0);

        let saved: SavedModel = model.into();
        let path = dir.path().join("lr.model");
        save_model(&saved, &path).unwrap();
        let loaded = load_model(&path).unwrap();
        let pred = loaded.predict(TestKernel::Identity, Some(&covar)).unwrap();
        assert_eq!(pred.values.len(), N);
        assert!(loaded.predict(TestKernel::Identity, None).is_err());
    }
}
