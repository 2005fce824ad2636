use encrypted_diffusion_sampler::{
    he::{CkksContext, CkksParams},
    schedule::NoiseSchedule,
    DenoisingModel, Parameterization, PlmsSampler, Result, SampleRequest, SamplerConfig,
    SamplerErr, ScoreCorrector, StrategyConfig,
};
use ndarray::{Array, Array2, Array4};
use rand::{rngs::StdRng, SeedableRng};

/// Predicts the first conditioning value everywhere, or 0 without conditioning.
struct EchoModel {
    schedule: NoiseSchedule,
    parameterization: Parameterization,
    fail_at: Option<usize>,
}

impl EchoModel {
    fn new() -> Self {
        Self {
            schedule: NoiseSchedule::from_alphas_cumprod(vec![0.99, 0.9, 0.8, 0.5]).unwrap(),
            parameterization: Parameterization::Eps,
            fail_at: None,
        }
    }
}

impl DenoisingModel for EchoModel {
    type Cond = Array2<f32>;

    fn noise_schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    fn parameterization(&self) -> Parameterization {
        self.parameterization
    }

    fn apply_model(
        &self,
        x: &Array4<f32>,
        t: usize,
        cond: Option<&Self::Cond>,
    ) -> Result<Array4<f32>> {
        if self.fail_at == Some(t) {
            return Err(SamplerErr::Model(format!("no estimate at t = {t}")));
        }

        let value = cond.map(|c| c[[0, 0]]).unwrap_or(0.0);
        Ok(Array4::from_elem(x.dim(), value))
    }
}

/// Shifts every estimate by a constant.
struct Shift(f32);

impl ScoreCorrector<EchoModel> for Shift {
    fn modify_score(
        &self,
        _model: &EchoModel,
        e_t: Array4<f32>,
        _x: &Array4<f32>,
        _t: usize,
        _cond: Option<&Array2<f32>>,
    ) -> Result<Array4<f32>> {
        Ok(e_t + self.0)
    }
}

fn config() -> SamplerConfig {
    SamplerConfig {
        num_steps: 4,
        timesteps: Some(vec![0, 1, 2, 3]),
        shape: [1, 2, 2],
        ckks: CkksParams {
            ring_degree: 64,
            coeff_mod_bit_sizes: vec![50, 30],
            scale_bits: 30,
        },
        strategy: StrategyConfig::Sparse { threshold: 0.1 },
        seed: Some(11),
        ..Default::default()
    }
}

fn x_t() -> Array4<f32> {
    Array::from_shape_vec((1, 1, 2, 2), vec![0.3, -0.05, 1.2, 0.0]).unwrap()
}

fn cond(value: f32, batch: usize) -> Array2<f32> {
    Array2::from_elem((batch, 4), value)
}

fn assert_all_close(a: &Array4<f32>, b: &Array4<f32>) {
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-4, "{a:?} vs {b:?}");
    }
}

#[test]
fn batch_mismatch_only_warns() {
    let model = EchoModel::new();
    let sampler = PlmsSampler::new(&model, config()).unwrap();

    let matching = cond(0.5, 1);
    let expected = sampler
        .sample(SampleRequest::new().with_conditioning(&matching).with_x_t(x_t()), None)
        .unwrap();
    assert!(expected.warnings.is_empty());

    let oversized = cond(0.5, 3);
    let output = sampler
        .sample(SampleRequest::new().with_conditioning(&oversized).with_x_t(x_t()), None)
        .unwrap();

    assert_eq!(output.warnings.len(), 1);
    assert!(output.warnings[0].contains("Got 3 conditionings but batch-size is 1"));
    assert_all_close(&output.samples, &expected.samples);
}

#[test]
fn guidance_combines_both_branches() {
    let model = EchoModel::new();

    let guided_config = SamplerConfig {
        guidance_scale: 3.0,
        ..config()
    };
    let guided = PlmsSampler::new(&model, guided_config).unwrap();
    let c = cond(1.0, 1);
    let u = cond(0.25, 1);
    let output = guided
        .sample(
            SampleRequest::new()
                .with_conditioning(&c)
                .with_unconditional(&u)
                .with_x_t(x_t()),
            None,
        )
        .unwrap();

    // 0.25 + 3 * (1 - 0.25)
    let plain = PlmsSampler::new(&model, config()).unwrap();
    let combined = cond(2.5, 1);
    let expected = plain
        .sample(SampleRequest::new().with_conditioning(&combined).with_x_t(x_t()), None)
        .unwrap();

    assert_all_close(&output.samples, &expected.samples);
}

#[test]
fn unit_guidance_skips_the_unconditional_branch() {
    let model = EchoModel::new();
    let sampler = PlmsSampler::new(&model, config()).unwrap();

    let c = cond(1.0, 1);
    let u = cond(-7.0, 1);
    let with_uncond = sampler
        .sample(
            SampleRequest::new()
                .with_conditioning(&c)
                .with_unconditional(&u)
                .with_x_t(x_t()),
            None,
        )
        .unwrap();
    let without = sampler
        .sample(SampleRequest::new().with_conditioning(&c).with_x_t(x_t()), None)
        .unwrap();

    assert_all_close(&with_uncond.samples, &without.samples);
}

#[test]
fn score_corrector_adjusts_the_estimate() {
    let model = EchoModel::new();
    let sampler = PlmsSampler::new(&model, config()).unwrap();

    let c = cond(0.5, 1);
    let shift: &dyn ScoreCorrector<EchoModel> = &Shift(0.25);
    let corrected = sampler
        .sample(
            SampleRequest::new()
                .with_conditioning(&c)
                .with_score_corrector(shift)
                .with_x_t(x_t()),
            None,
        )
        .unwrap();

    let shifted = cond(0.75, 1);
    let expected = sampler
        .sample(SampleRequest::new().with_conditioning(&shifted).with_x_t(x_t()), None)
        .unwrap();

    assert_all_close(&corrected.samples, &expected.samples);
}

#[test]
fn score_corrector_needs_an_eps_model() {
    let model = EchoModel {
        parameterization: Parameterization::X0,
        ..EchoModel::new()
    };
    let sampler = PlmsSampler::new(&model, config()).unwrap();

    let shift: &dyn ScoreCorrector<EchoModel> = &Shift(0.25);
    let err = sampler
        .sample(SampleRequest::new().with_score_corrector(shift), None)
        .unwrap_err();
    assert!(matches!(err, SamplerErr::Configuration(_)));
}

#[test]
fn invalid_configurations_abort_before_sampling() {
    let model = EchoModel::new();

    let eta = SamplerConfig {
        eta: 0.1,
        ..config()
    };
    assert!(matches!(
        PlmsSampler::new(&model, eta),
        Err(SamplerErr::Configuration(_))
    ));

    let no_rescale = SamplerConfig {
        ckks: CkksParams {
            ring_degree: 64,
            coeff_mod_bit_sizes: vec![50],
            scale_bits: 30,
        },
        ..config()
    };
    assert!(matches!(
        PlmsSampler::new(&model, no_rescale),
        Err(SamplerErr::Configuration(_))
    ));

    // Timesteps beyond the model's schedule are only caught once the schedule is built.
    let out_of_range = SamplerConfig {
        timesteps: Some(vec![0, 1, 2, 4]),
        ..config()
    };
    let sampler = PlmsSampler::new(&model, out_of_range).unwrap();
    assert!(matches!(
        sampler.sample(SampleRequest::new(), None),
        Err(SamplerErr::Configuration(_))
    ));
}

#[test]
fn mismatched_inputs_are_rejected() {
    let model = EchoModel::new();
    let sampler = PlmsSampler::new(&model, config()).unwrap();

    let wrong_x_t = Array4::zeros((1, 1, 3, 3));
    assert!(matches!(
        sampler.sample(SampleRequest::new().with_x_t(wrong_x_t), None),
        Err(SamplerErr::ShapeMismatch {
            what: "initial state",
            ..
        })
    ));

    let mask = Array4::ones((1, 1, 2, 2));
    let x0 = Array4::zeros((2, 1, 2, 2));
    assert!(matches!(
        sampler.sample(SampleRequest::new().with_inpaint(mask, x0), None),
        Err(SamplerErr::ShapeMismatch { .. })
    ));
}

#[test]
fn model_failures_abort_the_run() {
    let model = EchoModel {
        fail_at: Some(1),
        ..EchoModel::new()
    };
    let sampler = PlmsSampler::new(&model, config()).unwrap();

    let mut completed = 0;
    let mut callback = |_: usize| completed += 1;
    let err = sampler
        .sample(
            SampleRequest::new().with_x_t(x_t()),
            Some(&mut callback as &mut dyn FnMut(usize)),
        )
        .unwrap_err();

    assert!(matches!(err, SamplerErr::Model(_)));
    // Steps at t = 3 and t = 2 went through, the one at t = 1 did not.
    assert_eq!(completed, 2);
}

#[test]
fn exhausted_ciphertexts_report_depth() {
    let mut rng = StdRng::seed_from_u64(0);
    let params = CkksParams {
        ring_degree: 64,
        coeff_mod_bit_sizes: vec![50, 30],
        scale_bits: 30,
    };
    let ctx = CkksContext::new(params, &mut rng).unwrap();

    let ct = ctx.encrypt(&[0.5, -1.5], &mut rng).unwrap();
    let once = ctx.mul_scalar(&ct, 1.1).unwrap();

    assert!(matches!(
        ctx.mul_scalar(&once, 1.1),
        Err(SamplerErr::DepthExceeded {
            required: 1,
            available: 0
        })
    ));

    // Additions do not consume depth.
    let sum = ctx.add_plain(&once, &[1.0, 1.0]).unwrap();
    let decrypted = ctx.decrypt(&sum);
    assert!((decrypted[0] - 1.55).abs() < 1e-5);
    assert!((decrypted[1] + 0.65).abs() < 1e-5);
}
