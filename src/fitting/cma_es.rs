//! CMA-ES maximizer over box-bounded parameters.
//!
//! The search distribution lives in unbounded ℝⁿ; each coordinate is mapped
//! into its `[min, max]` interval by a scaled logistic before the objective
//! sees it, so every evaluated parameter vector respects the bounds.
//!
//! ```text
//! raw ∈ ℝ  ──σ──►  min + (max − min)·σ(raw)  ∈ [min, max]
//! ```

use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

const INITIAL_SIGMA: f64 = 0.5;
const MIN_SIGMA: f64 = 1e-12;
const MAX_SIGMA: f64 = 10.0;
const MIN_EIGENVALUE: f64 = 1e-20;

/// Closed interval of one coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
}

impl Bound {
    pub fn new(min: f64, max: f64) -> Self {
        assert!(min < max, "empty bound [{min}, {max}]");
        Self { min, max }
    }

    /// Unbounded → bounded.
    pub fn decode(&self, raw: f64) -> f64 {
        self.min + (self.max - self.min) / (1.0 + (-raw).exp())
    }

    /// Bounded → unbounded. Values at or beyond the edges are pulled in
    /// slightly so the logit stays finite.
    pub fn encode(&self, value: f64) -> f64 {
        let t = ((value - self.min) / (self.max - self.min)).clamp(1e-4, 1.0 - 1e-4);
        (t / (1.0 - t)).ln()
    }

    pub fn midpoint(&self) -> f64 {
        0.5 * (self.min + self.max)
    }
}

impl From<(f64, f64)> for Bound {
    fn from((min, max): (f64, f64)) -> Self {
        Self::new(min, max)
    }
}

/// Result of one optimizer run.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimum {
    /// Best parameters seen, in bounded space
    pub params: Vec<f64>,
    /// Objective value at `params`
    pub fitness: f64,
    pub generations: usize,
    /// The search settled before the generation cap
    pub converged: bool,
}

/// Evolution-strategy state. Fitness is maximized.
pub struct CmaEs {
    dimension: usize,
    lambda: usize,
    mu: usize,
    weights: DVector<f64>,
    mu_eff: f64,
    c_c: f64,
    c_sigma: f64,
    c_1: f64,
    c_mu: f64,
    d_sigma: f64,
    /// E‖N(0, I)‖
    chi_n: f64,
    mean: DVector<f64>,
    sigma: f64,
    covariance: DMatrix<f64>,
    p_c: DVector<f64>,
    p_sigma: DVector<f64>,
    bounds: Vec<Bound>,
    generation: usize,
    rng: SmallRng,
}

impl CmaEs {
    /// Starts the search at `start` (bounded space) with a seeded generator.
    ///
    /// # Panics
    /// Panics if `bounds` is empty or its length differs from `start`.
    pub fn new(bounds: Vec<Bound>, start: &[f64], seed: u64) -> Self {
        assert!(!bounds.is_empty(), "at least one dimension required");
        assert_eq!(
            bounds.len(),
            start.len(),
            "{} bounds for a {}-dimensional start",
            bounds.len(),
            start.len()
        );

        let dimension = bounds.len();
        let n = dimension as f64;

        // Hansen's default strategy parameters
        let lambda = 4 + (3.0 * n.ln()).floor() as usize;
        let mu = lambda / 2;
        let raw: Vec<f64> = (1..=mu)
            .map(|i| (mu as f64 + 0.5).ln() - (i as f64).ln())
            .collect();
        let total: f64 = raw.iter().sum();
        let weights = DVector::from_iterator(mu, raw.iter().map(|w| w / total));
        let mu_eff = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();

        let c_sigma = (mu_eff + 2.0) / (n + mu_eff + 5.0);
        let d_sigma = 1.0 + 2.0 * (((mu_eff - 1.0) / (n + 1.0)).sqrt() - 1.0).max(0.0) + c_sigma;
        let c_c = (4.0 + mu_eff / n) / (n + 4.0 + 2.0 * mu_eff / n);
        let c_1 = 2.0 / ((n + 1.3).powi(2) + mu_eff);
        let c_mu = (2.0 * (mu_eff - 2.0 + 1.0 / mu_eff) / ((n + 2.0).powi(2) + mu_eff)).min(1.0 - c_1);
        let chi_n = n.sqrt() * (1.0 - 1.0 / (4.0 * n) + 1.0 / (21.0 * n * n));

        let mean = DVector::from_iterator(
            dimension,
            start.iter().zip(&bounds).map(|(&v, b)| b.encode(v)),
        );

        Self {
            dimension,
            lambda,
            mu,
            weights,
            mu_eff,
            c_c,
            c_sigma,
            c_1,
            c_mu,
            d_sigma,
            chi_n,
            mean,
            sigma: INITIAL_SIGMA,
            covariance: DMatrix::identity(dimension, dimension),
            p_c: DVector::zeros(dimension),
            p_sigma: DVector::zeros(dimension),
            bounds,
            generation: 0,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn population_size(&self) -> usize {
        self.lambda
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Distribution mean mapped into bounded space.
    pub fn mean(&self) -> Vec<f64> {
        self.decode(&self.mean)
    }

    pub fn decode(&self, x: &DVector<f64>) -> Vec<f64> {
        x.iter().zip(&self.bounds).map(|(&raw, b)| b.decode(raw)).collect()
    }

    /// Draws one generation of candidates in unbounded space.
    pub fn sample(&mut self) -> Vec<DVector<f64>> {
        let eigen = SymmetricEigen::new(self.covariance.clone());
        let scale = DMatrix::from_diagonal(&eigen.eigenvalues.map(|v| v.max(MIN_EIGENVALUE).sqrt()));
        let transform = &eigen.eigenvectors * scale;

        (0..self.lambda)
            .map(|_| {
                let z = DVector::from_iterator(
                    self.dimension,
                    (0..self.dimension).map(|_| StandardNormal.sample(&mut self.rng)),
                );
                &self.mean + self.sigma * &transform * z
            })
            .collect()
    }

    /// Adapts mean, step size and covariance from one evaluated generation.
    /// Non-finite fitness values rank last.
    pub fn tell(&mut self, population: &[DVector<f64>], fitness: &[f64]) {
        assert_eq!(population.len(), self.lambda);
        assert_eq!(fitness.len(), self.lambda);

        let rank = |f: f64| if f.is_finite() { f } else { f64::NEG_INFINITY };
        let mut order: Vec<usize> = (0..self.lambda).collect();
        order.sort_by(|&a, &b| rank(fitness[b]).total_cmp(&rank(fitness[a])));
        let elite = &order[..self.mu];

        let old_mean = self.mean.clone();
        let mut mean = DVector::zeros(self.dimension);
        for (w, &i) in self.weights.iter().zip(elite) {
            mean += *w * &population[i];
        }
        let step = (&mean - &old_mean) / self.sigma;

        let eigen = SymmetricEigen::new(self.covariance.clone());
        let inv_scale =
            DMatrix::from_diagonal(&eigen.eigenvalues.map(|v| 1.0 / v.max(MIN_EIGENVALUE).sqrt()));
        let inv_sqrt_c = &eigen.eigenvectors * inv_scale * eigen.eigenvectors.transpose();

        self.p_sigma = (1.0 - self.c_sigma) * &self.p_sigma
            + (self.c_sigma * (2.0 - self.c_sigma) * self.mu_eff).sqrt() * inv_sqrt_c * &step;
        let ps_norm = self.p_sigma.norm();

        let decay = 1.0 - (1.0 - self.c_sigma).powi(2 * (self.generation as i32 + 1));
        let h_sigma = if ps_norm / decay.sqrt() < (1.4 + 2.0 / (self.dimension as f64 + 1.0)) * self.chi_n {
            1.0
        } else {
            0.0
        };

        self.p_c = (1.0 - self.c_c) * &self.p_c
            + h_sigma * (self.c_c * (2.0 - self.c_c) * self.mu_eff).sqrt() * &step;

        let mut rank_mu = DMatrix::zeros(self.dimension, self.dimension);
        for (w, &i) in self.weights.iter().zip(elite) {
            let y = (&population[i] - &old_mean) / self.sigma;
            rank_mu += *w * &y * y.transpose();
        }

        let delta_h = (1.0 - h_sigma) * self.c_c * (2.0 - self.c_c);
        let keep = 1.0 - self.c_1 - self.c_mu + self.c_1 * delta_h;
        let covariance = keep * &self.covariance
            + self.c_1 * &self.p_c * self.p_c.transpose()
            + self.c_mu * rank_mu;
        self.covariance = (&covariance + covariance.transpose()) * 0.5;

        self.sigma *= ((self.c_sigma / self.d_sigma) * (ps_norm / self.chi_n - 1.0)).exp();
        self.sigma = self.sigma.clamp(MIN_SIGMA, MAX_SIGMA);
        self.mean = mean;

        if self.mean.iter().any(|v| !v.is_finite()) || !self.sigma.is_finite() {
            log::warn!(
                "CMA-ES generation {}: non-finite state, restarting distribution at the previous mean",
                self.generation
            );
            self.mean = old_mean;
            self.sigma = INITIAL_SIGMA;
            self.covariance = DMatrix::identity(self.dimension, self.dimension);
            self.p_c = DVector::zeros(self.dimension);
            self.p_sigma = DVector::zeros(self.dimension);
        }

        self.generation += 1;
    }

    /// Runs until the search has settled or `max_generations` elapse, and
    /// returns the best candidate seen.
    ///
    /// The search has settled when any of these holds:
    /// - the step size is below `tolerance`
    /// - every coordinate of the population spans less than `tolerance` of
    ///   its bound width
    /// - the best fitness of the last [`STALL_WINDOW`] generations varies by
    ///   less than [`STALL_TOLERANCE`]
    ///
    /// The last two end searches whose optimum sits on a bound, where the
    /// unbounded mean drifts off instead of contracting.
    pub fn maximize<F>(&mut self, objective: F, max_generations: usize, tolerance: f64) -> Optimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let mut best = Optimum {
            params: self.mean(),
            fitness: f64::NEG_INFINITY,
            generations: 0,
            converged: false,
        };
        let mut history: VecDeque<f64> = VecDeque::with_capacity(STALL_WINDOW);

        while self.generation < max_generations {
            let population = self.sample();
            let decoded: Vec<Vec<f64>> = population.iter().map(|x| self.decode(x)).collect();
            let fitness: Vec<f64> = decoded.iter().map(|x| objective(x)).collect();

            let mut generation_best = f64::NEG_INFINITY;
            for (x, &f) in decoded.iter().zip(&fitness) {
                if !f.is_finite() {
                    continue;
                }
                generation_best = generation_best.max(f);
                if f > best.fitness {
                    best.fitness = f;
                    best.params = x.clone();
                }
            }
            if history.len() == STALL_WINDOW {
                history.pop_front();
            }
            history.push_back(generation_best);

            self.tell(&population, &fitness);
            if self.sigma < tolerance
                || self.population_collapsed(&decoded, tolerance)
                || stalled(&history)
            {
                best.converged = true;
                break;
            }
        }

        best.generations = self.generation;
        best
    }

    fn population_collapsed(&self, decoded: &[Vec<f64>], tolerance: f64) -> bool {
        self.bounds.iter().enumerate().all(|(d, b)| {
            let (lo, hi) = decoded
                .iter()
                .map(|x| x[d])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            (hi - lo) / (b.max - b.min) < tolerance
        })
    }
}

/// Generations of best-fitness history checked for stagnation.
pub const STALL_WINDOW: usize = 20;
/// Change in best fitness treated as no progress.
pub const STALL_TOLERANCE: f64 = 1e-10;

fn stalled(history: &VecDeque<f64>) -> bool {
    if history.len() < STALL_WINDOW || !history.iter().all(|f| f.is_finite()) {
        return false;
    }
    let (lo, hi) = history
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    hi - lo < STALL_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_bounds(n: usize) -> Vec<Bound> {
        vec![Bound::new(0.0, 1.0); n]
    }

    #[test]
    fn test_decode_stays_inside_bound() {
        let bound = Bound::new(-5.0, 5.0);
        for raw in [-800.0, -10.0, -1.0, 0.0, 1.0, 10.0, 800.0] {
            let v = bound.decode(raw);
            assert!((-5.0..=5.0).contains(&v), "raw={raw} v={v}");
        }
        assert_eq!(bound.decode(0.0), bound.midpoint());
    }

    #[test]
    fn test_encode_inverts_decode() {
        let bound = Bound::new(0.0, 20.0);
        for raw in [-3.0, -0.5, 0.0, 1.2, 4.0] {
            let back = bound.encode(bound.decode(raw));
            assert!((back - raw).abs() < 1e-6, "raw={raw} back={back}");
        }
        // Edges are pulled in rather than mapped to ±∞
        assert!(bound.encode(0.0).is_finite());
        assert!(bound.encode(20.0).is_finite());
    }

    #[test]
    #[should_panic]
    fn test_dimension_mismatch_panics() {
        CmaEs::new(unit_bounds(3), &[0.5, 0.5], 0);
    }

    #[test]
    fn test_same_seed_same_search() {
        let objective = |x: &[f64]| -(x[0] - 0.3).powi(2) - (x[1] - 0.8).powi(2);
        let a = CmaEs::new(unit_bounds(2), &[0.5, 0.5], 42).maximize(objective, 40, 1e-8);
        let b = CmaEs::new(unit_bounds(2), &[0.5, 0.5], 42).maximize(objective, 40, 1e-8);
        assert_eq!(a, b);
    }

    #[test]
    fn test_finds_interior_maximum() {
        let bounds = vec![Bound::new(0.0, 1.0), Bound::new(0.0, 20.0), Bound::new(-5.0, 5.0)];
        let target = [0.7, 4.23, 0.17];
        let objective = |x: &[f64]| -x.iter().zip(&target).map(|(a, b)| (a - b).powi(2)).sum::<f64>();
        let mut es = CmaEs::new(bounds, &[0.5, 10.0, 0.0], 7);
        let optimum = es.maximize(objective, 600, 1e-7);

        assert!(optimum.converged, "stopped after {} generations", optimum.generations);
        for (x, t) in optimum.params.iter().zip(&target) {
            assert!((x - t).abs() < 1e-3, "x={x} target={t}");
        }
    }

    #[test]
    fn test_log_likelihood_shaped_objective() {
        // Bernoulli log-likelihood: 30 successes in 100, maximum at 0.3
        let objective = |x: &[f64]| 30.0 * x[0].ln() + 70.0 * (1.0 - x[0]).ln();
        let optimum = CmaEs::new(unit_bounds(1), &[0.5], 3).maximize(objective, 400, 1e-8);
        assert!((optimum.params[0] - 0.3).abs() < 1e-3, "p={}", optimum.params[0]);
    }

    #[test]
    fn test_non_finite_fitness_is_ranked_last() {
        // Half the box returns NaN; the search must still settle in the valid half
        let objective = |x: &[f64]| {
            if x[0] > 0.5 {
                f64::NAN
            } else {
                -(x[0] - 0.2).powi(2)
            }
        };
        let mut es = CmaEs::new(unit_bounds(1), &[0.3], 11);
        let optimum = es.maximize(objective, 400, 1e-8);
        assert!(optimum.fitness.is_finite());
        assert!((optimum.params[0] - 0.2).abs() < 1e-3);
        assert!(es.mean().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_generation_cap_without_convergence() {
        let objective = |x: &[f64]| -(x[0] - 0.6).powi(2);
        let optimum = CmaEs::new(unit_bounds(1), &[0.1], 5).maximize(objective, 3, 1e-12);
        assert!(!optimum.converged);
        assert_eq!(optimum.generations, 3);
        assert!(optimum.fitness.is_finite());
    }

    #[test]
    fn test_optimum_on_bound_converges() {
        // Increasing in x: the best point is the upper bound
        let objective = |x: &[f64]| x[0];
        let mut es = CmaEs::new(unit_bounds(1), &[0.5], 21);
        let optimum = es.maximize(objective, 5000, 1e-8);
        assert!(optimum.converged, "stopped after {} generations", optimum.generations);
        assert!(optimum.params[0] > 0.999, "x={}", optimum.params[0]);
    }

    #[test]
    fn test_population_size_grows_with_dimension() {
        assert_eq!(CmaEs::new(unit_bounds(1), &[0.5], 0).population_size(), 4);
        assert_eq!(CmaEs::new(unit_bounds(7), &[0.5; 7], 0).population_size(), 9);
    }
}
