//! Time integration of the fluid state vectors.
//!
//! All functions operate on full dof vectors (velocity and pressure components). Values in
//! pressure slots of acceleration vectors carry no meaning but are updated consistently.
use crate::config::{Predictor, TimeIntegrationScheme, TimeParameters};
use crate::error::XFluidError;
use crate::nalgebra::{DVector, Vector3};
use serde::{Deserialize, Serialize};

/// Time-dependent parameters, refreshed by the driver at the start of each step.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeParams {
    pub scheme: TimeIntegrationScheme,
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub dt_previous: f64,
    pub theta: f64,
    pub alpha_f: f64,
    pub alpha_m: f64,
    pub gamma: f64,
}

impl TimeParams {
    pub fn new(parameters: &TimeParameters) -> Self {
        Self {
            scheme: parameters.scheme,
            step: 0,
            time: 0.0,
            dt: parameters.dt,
            dt_previous: parameters.dt,
            theta: parameters.theta,
            alpha_f: parameters.alpha_f,
            alpha_m: parameters.alpha_m,
            gamma: parameters.gamma,
        }
    }

    /// Advances time and step counter by one step of size `dt`.
    pub fn advance(&mut self, dt: f64) {
        self.dt_previous = if self.step == 0 { dt } else { self.dt };
        self.dt = dt;
        self.step += 1;
        self.time += dt;
    }

    /// Sets `theta` for the current step.
    ///
    /// The first `num_start_steps` steps use backward Euler. BDF2 expresses its variable
    /// step weights through an equivalent `theta`.
    pub fn set_theta(&mut self, parameters: &TimeParameters) -> Result<(), XFluidError> {
        if self.step < 1 {
            return Err(XFluidError::Configuration(format!(
                "theta requested for step {} before the first time step",
                self.step
            )));
        }
        self.theta = match self.scheme {
            TimeIntegrationScheme::Stationary => 1.0,
            _ if self.step <= parameters.num_start_steps => 1.0,
            TimeIntegrationScheme::OneStepTheta => parameters.theta,
            TimeIntegrationScheme::Bdf2 if self.step > 1 => {
                (self.dt + self.dt_previous) / (2.0 * self.dt + self.dt_previous)
            }
            // BDF2 has no history in the first step
            TimeIntegrationScheme::Bdf2 => 1.0,
            TimeIntegrationScheme::AfGenAlpha | TimeIntegrationScheme::NpGenAlpha => parameters.theta,
        };
        Ok(())
    }

    /// Whether the current step is a startup step integrated with backward Euler.
    pub fn is_startup_step(&self, parameters: &TimeParameters) -> bool {
        !self.scheme.is_stationary() && self.step <= parameters.num_start_steps
    }

    /// Factor mapping the force residual to the assembled residual.
    pub fn residual_scaling(&self) -> f64 {
        match self.scheme {
            TimeIntegrationScheme::Stationary => 1.0,
            TimeIntegrationScheme::OneStepTheta | TimeIntegrationScheme::Bdf2 => self.theta * self.dt,
            TimeIntegrationScheme::AfGenAlpha | TimeIntegrationScheme::NpGenAlpha => {
                self.gamma / self.alpha_m * self.dt
            }
        }
    }

    /// Derivative of the evaluated acceleration with respect to the new velocity.
    pub fn mass_factor(&self) -> f64 {
        match self.scheme {
            TimeIntegrationScheme::Stationary => 0.0,
            _ => 1.0 / self.residual_scaling(),
        }
    }

    /// Derivative of the evaluated velocity with respect to the new velocity.
    pub fn velocity_factor(&self) -> f64 {
        if self.scheme.is_generalized_alpha() {
            self.alpha_f
        } else {
            1.0
        }
    }

    /// Time at which the momentum equation is evaluated.
    pub fn evaluation_time(&self) -> f64 {
        if self.scheme.is_generalized_alpha() {
            self.time - (1.0 - self.alpha_f) * self.dt
        } else {
            self.time
        }
    }

    pub fn is_stationary(&self) -> bool {
        self.scheme.is_stationary()
    }
}

/// `trueresidual = -residual / residual_scaling`.
pub fn true_residual(residual: &DVector<f64>, time: &TimeParams) -> DVector<f64> {
    residual * (-1.0 / time.residual_scaling())
}

/// History vector entering the time-discrete momentum equation.
pub fn compute_history(time: &TimeParams, veln: &DVector<f64>, velnm: &DVector<f64>, accn: &DVector<f64>) -> DVector<f64> {
    match time.scheme {
        TimeIntegrationScheme::Stationary | TimeIntegrationScheme::AfGenAlpha | TimeIntegrationScheme::NpGenAlpha => {
            DVector::zeros(veln.len())
        }
        TimeIntegrationScheme::OneStepTheta => veln + accn * (time.dt * (1.0 - time.theta)),
        TimeIntegrationScheme::Bdf2 if time.theta < 1.0 => {
            // Variable step BDF2 in the form (velnp - hist) / (theta dt)
            let (dta, dtp) = (time.dt, time.dt_previous);
            let factor = (dta + dtp) * (dta + dtp) / (dtp * (2.0 * dta + dtp));
            veln * factor - velnm * (factor - 1.0)
        }
        TimeIntegrationScheme::Bdf2 => veln.clone(),
    }
}

/// Acceleration at the end of the step.
pub fn compute_accelerations(
    time: &TimeParams,
    velnp: &DVector<f64>,
    veln: &DVector<f64>,
    velnm: &DVector<f64>,
    accn: &DVector<f64>,
) -> DVector<f64> {
    let dt = time.dt;
    match time.scheme {
        TimeIntegrationScheme::Stationary => DVector::zeros(velnp.len()),
        TimeIntegrationScheme::OneStepTheta => {
            let theta = time.theta;
            (velnp - veln) / (theta * dt) + accn * (1.0 - 1.0 / theta)
        }
        TimeIntegrationScheme::Bdf2 if time.step > 1 => {
            let (dta, dtp) = (time.dt, time.dt_previous);
            let fact1 = (2.0 * dta + dtp) / (dta * (dta + dtp));
            let fact2 = (dta + dtp) / (dta * dtp);
            let fact3 = dta / (dtp * (dta + dtp));
            velnp * fact1 - veln * fact2 + velnm * fact3
        }
        TimeIntegrationScheme::Bdf2 => (velnp - veln) / dt,
        TimeIntegrationScheme::AfGenAlpha | TimeIntegrationScheme::NpGenAlpha => {
            accn * (1.0 - 1.0 / time.gamma) + (velnp - veln) / (time.gamma * dt)
        }
    }
}

/// Intermediate generalized-alpha states `(velaf, accam)`.
pub fn generalized_alpha_intermediate(
    time: &TimeParams,
    velnp: &DVector<f64>,
    veln: &DVector<f64>,
    accnp: &DVector<f64>,
    accn: &DVector<f64>,
) -> (DVector<f64>, DVector<f64>) {
    let velaf = velnp * time.alpha_f + veln * (1.0 - time.alpha_f);
    let accam = accnp * time.alpha_m + accn * (1.0 - time.alpha_m);
    (velaf, accam)
}

/// Acceleration at the evaluation state as a function of the current `velnp`.
///
/// Its derivative with respect to `velnp` is [`TimeParams::mass_factor`].
pub fn evaluation_acceleration(
    time: &TimeParams,
    velnp: &DVector<f64>,
    veln: &DVector<f64>,
    accn: &DVector<f64>,
    hist: &DVector<f64>,
) -> DVector<f64> {
    match time.scheme {
        TimeIntegrationScheme::Stationary => DVector::zeros(velnp.len()),
        TimeIntegrationScheme::OneStepTheta | TimeIntegrationScheme::Bdf2 => (velnp - hist) * time.mass_factor(),
        TimeIntegrationScheme::AfGenAlpha | TimeIntegrationScheme::NpGenAlpha => {
            let accnp = accn * (1.0 - 1.0 / time.gamma) + (velnp - veln) / (time.gamma * time.dt);
            accnp * time.alpha_m + accn * (1.0 - time.alpha_m)
        }
    }
}

/// Velocity at which the momentum equation is evaluated.
pub fn evaluation_velocity(time: &TimeParams, velnp: &DVector<f64>, veln: &DVector<f64>) -> DVector<f64> {
    if time.scheme.is_generalized_alpha() {
        velnp * time.alpha_f + veln * (1.0 - time.alpha_f)
    } else {
        velnp.clone()
    }
}

/// Explicit predictor for the new velocity and pressure.
///
/// Returns `None` for predictors that are not explicit: `SteadyState` keeps `velnp` unchanged,
/// and `TangVel` needs the assembled system of the new cut, so the driver runs it after the
/// Dirichlet values of the new time level are applied.
pub fn explicit_predictor(
    predictor: Predictor,
    time: &TimeParams,
    veln: &DVector<f64>,
    velnm: &DVector<f64>,
    accn: &DVector<f64>,
) -> Option<DVector<f64>> {
    let dt = time.dt;
    match predictor {
        Predictor::SteadyState | Predictor::TangVel => None,
        Predictor::ZeroAcceleration => Some(veln + accn * ((1.0 - time.theta) * dt)),
        Predictor::ConstantAcceleration => Some(veln + accn * dt),
        Predictor::ConstantIncrement => Some(veln * 2.0 - velnm),
        Predictor::ExplicitSecondOrderMidpoint => Some(velnm + accn * (2.0 * dt)),
    }
}

/// Grid velocity of a moving background mesh.
pub fn grid_velocity(
    time: &TimeParams,
    dispnp: &[Vector3<f64>],
    dispn: &[Vector3<f64>],
    dispnm: &[Vector3<f64>],
    gridvn: &[Vector3<f64>],
) -> Vec<Vector3<f64>> {
    let dt = time.dt;
    let n = dispnp.len();
    (0..n)
        .map(|i| match time.scheme {
            TimeIntegrationScheme::Bdf2 if time.step > 1 => {
                dispnp[i] * (1.5 / dt) - dispn[i] * (2.0 / dt) + dispnm[i] * (0.5 / dt)
            }
            TimeIntegrationScheme::OneStepTheta if time.theta < 1.0 => {
                (dispnp[i] - dispn[i]) / (time.theta * dt) - gridvn[i] * (1.0 / time.theta - 1.0)
            }
            TimeIntegrationScheme::Stationary => Vector3::zeros(),
            _ => (dispnp[i] - dispn[i]) / dt,
        })
        .collect()
}
