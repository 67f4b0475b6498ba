//! Open-loop thrust control: a deterministic chain from commanded thrust
//! to the two valve angles, built on static property tables and
//! closed-form fluid equations. No iteration anywhere; every table lookup
//! clamps instead of erroring.
//!
//! Unit conventions follow the stand: thrust lbf, pressure psi,
//! temperature K, mass flow lbm/s, density lb/in^3, areas in^2.

use crate::interp::LookupTable;
use crate::sensors::{FluidLine, SensorSnapshot};
use vcmd_config::DefaultConditionsCfg;

/// Engine throat area, in^2.
pub const THROAT_AREA: f32 = 1.69;
/// Characteristic velocity c*, ft/s.
pub const C_STAR: f32 = 4998.0654;
/// Gravity, ft/s^2.
pub const GRAVITY_FT_S2: f32 = 32.1740;
/// Fixed oxidizer-to-fuel mass ratio R (mdot_ox = R * mdot_ipa).
pub const MIXTURE_RATIO: f32 = 1.2;

const IN3_TO_GAL: f32 = 0.004329;
const PER_SEC_TO_PER_MIN: f32 = 60.0;
const DENSITY_WATER: f32 = 0.0360724; // lb/in^3
const INCHES_PER_FOOT: f32 = 12.0;

/// IPA density is flat over the stand's temperature range, lb/in^3.
const IPA_DENSITY: f32 = 0.02836;
/// IPA vapor pressure near ambient, psi.
const IPA_VAPOR_PRESSURE: f32 = 0.64;

/// Thrust (lbf) to thrust coefficient Cf (unitless).
const CF_THRUST_TABLE: &[(f32, f32)] = &[(220.0, 1.12), (550.0, 1.3)];

/// LOX temperature (K) to density (lb/in^3).
const OX_DENSITY_TABLE: &[(f32, f32)] = &[
    (55.0, 0.04709027778),
    (60.0, 0.04631539352),
    (65.0, 0.04550925926),
    (70.0, 0.0446880787),
    (75.0, 0.04385474537),
    (80.0, 0.04300810185),
    (85.0, 0.04214525463),
    (90.0, 0.04126099537),
    (95.0, 0.04035127315),
    (100.0, 0.03941087963),
    (105.0, 0.03843229167),
    (110.0, 0.03740856481),
    (115.0, 0.03632986111),
    (120.0, 0.03518287037),
    (125.0, 0.03394965278),
    (130.0, 0.03260416667),
    (135.0, 0.03110532407),
    (140.0, 0.02938020833),
    (145.0, 0.0272806713),
    (150.0, 0.02440335648),
];

/// LOX temperature (K) to vapor pressure (psi).
const OX_VAPOR_PRESSURE_TABLE: &[(f32, f32)] = &[
    (55.0, 0.0259),
    (60.0, 0.10527),
    (65.0, 0.33866),
    (70.0, 0.90826),
    (75.0, 2.1099),
    (80.0, 4.369),
    (85.0, 8.2426),
    (90.0, 14.41),
    (95.0, 23.653),
    (100.0, 36.84),
    (105.0, 54.901),
    (110.0, 78.814),
    (115.0, 109.59),
    (120.0, 148.27),
    (125.0, 195.93),
    (130.0, 253.68),
    (135.0, 322.72),
    (140.0, 404.33),
    (145.0, 500.05),
    (150.0, 611.86),
];

/// LOX valve flow coefficient (unitless) to angle (degrees), from the
/// valve characterization bench data.
const LOX_CV_ANGLE_TABLE: &[(f32, f32)] = &[
    (0.0314, 10.0),
    (0.0492, 15.0),
    (0.0766, 20.0),
    (0.1186, 25.0),
    (0.1818, 30.0),
    (0.2750, 35.0),
    (0.4074, 40.0),
    (0.5868, 45.0),
    (0.8145, 50.0),
    (1.0806, 55.0),
    (1.3633, 60.0),
    (1.6348, 65.0),
    (1.8714, 70.0),
    (2.0606, 75.0),
    (2.2020, 80.0),
    (2.3022, 85.0),
    (2.3707, 90.0),
];

/// IPA valve flow coefficient (unitless) to angle (degrees).
const IPA_CV_ANGLE_TABLE: &[(f32, f32)] = &[
    (0.0147, 10.0),
    (0.0241, 15.0),
    (0.0395, 20.0),
    (0.0645, 25.0),
    (0.1049, 30.0),
    (0.1691, 35.0),
    (0.2688, 40.0),
    (0.4185, 45.0),
    (0.6318, 50.0),
    (0.9146, 55.0),
    (1.2554, 60.0),
    (1.6220, 65.0),
    (1.9712, 70.0),
    (2.2671, 75.0),
    (2.4943, 80.0),
    (2.6557, 85.0),
    (2.7642, 90.0),
];

const fn static_table(points: &'static [(f32, f32)]) -> LookupTable {
    match LookupTable::new(points) {
        Ok(t) => t,
        Err(_) => panic!("static property table failed validation"),
    }
}

const CF_THRUST: LookupTable = static_table(CF_THRUST_TABLE);
const OX_DENSITY: LookupTable = static_table(OX_DENSITY_TABLE);
const OX_VAPOR_PRESSURE: LookupTable = static_table(OX_VAPOR_PRESSURE_TABLE);
const LOX_CV_ANGLE: LookupTable = static_table(LOX_CV_ANGLE_TABLE);
const IPA_CV_ANGLE: LookupTable = static_table(IPA_CV_ANGLE_TABLE);

/// Cavitating-venturi geometry on each feed line.
#[derive(Debug, Clone, Copy)]
pub struct Venturi {
    pub inlet_area: f32,
    pub throat_area: f32,
    pub cd: f32,
}

pub const OX_VENTURI: Venturi = Venturi {
    inlet_area: 0.127,
    throat_area: 0.0204,
    cd: 1.0,
};
pub const IPA_VENTURI: Venturi = Venturi {
    inlet_area: 0.127,
    throat_area: 0.0204,
    cd: 1.0,
};

/// The pair of angle commands produced by the model, degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValveAngles {
    pub lox: f32,
    pub ipa: f32,
}

/// Intermediate model quantities exposed for telemetry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelState {
    pub ol_lox_mdot: f32,
    pub ol_ipa_mdot: f32,
    pub measured_lox_mdot: f32,
    pub measured_ipa_mdot: f32,
    pub ol_lox_angle: f32,
    pub ol_ipa_angle: f32,
}

/// Fluid conditions the defaults-based path feeds the model.
#[derive(Debug, Clone, Copy)]
pub struct DefaultConditions {
    pub lox_upstream_pressure: f32,
    pub ipa_upstream_pressure: f32,
    pub lox_temperature: f32,
    pub ipa_temperature: f32,
}

impl From<DefaultConditionsCfg> for DefaultConditions {
    fn from(c: DefaultConditionsCfg) -> Self {
        Self {
            lox_upstream_pressure: c.lox_upstream_pressure,
            ipa_upstream_pressure: c.ipa_upstream_pressure,
            lox_temperature: c.lox_temperature,
            ipa_temperature: c.ipa_temperature,
        }
    }
}

/// Thrust coefficient Cf from thrust, via the calibration table.
pub fn cf(thrust: f32) -> f32 {
    CF_THRUST.interpolate(thrust)
}

/// Chamber pressure (psi) from thrust (lbf): Pc = F / Cf / At.
pub fn chamber_pressure(thrust: f32) -> f32 {
    thrust / cf(thrust) / THROAT_AREA
}

/// Total mass flow (lbm/s) from chamber pressure: mdot = Pc*At/c* * g.
pub fn mass_flow_rate(chamber_pressure: f32) -> f32 {
    chamber_pressure * THROAT_AREA / C_STAR * GRAVITY_FT_S2
}

/// Split total mass flow by the fixed mixture ratio R.
/// Returns `(mdot_ox, mdot_ipa)` with `mdot_ox = R * mdot_ipa`.
pub fn mass_balance(total_mass_flow: f32) -> (f32, f32) {
    let ipa = total_mass_flow / (1.0 + MIXTURE_RATIO);
    let ox = ipa * MIXTURE_RATIO;
    (ox, ipa)
}

/// LOX density (lb/in^3) from temperature (K), clamped table lookup.
pub fn ox_density(temperature: f32) -> f32 {
    OX_DENSITY.interpolate(temperature)
}

/// LOX vapor pressure (psi) from temperature (K), clamped table lookup.
pub fn ox_vapor_pressure(temperature: f32) -> f32 {
    OX_VAPOR_PRESSURE.interpolate(temperature)
}

pub fn ipa_density() -> f32 {
    IPA_DENSITY
}

pub fn ipa_vapor_pressure() -> f32 {
    IPA_VAPOR_PRESSURE
}

/// Downstream pressure target (psi) for a cavitating venturi passing
/// `mass_flow` of a fluid with the given density and vapor pressure:
/// the venturi pins its throat at vapor pressure, so the valve must
/// deliver `(mdot / (At*Cd))^2 / (2*g*rho) + Pv` at the venturi inlet.
pub fn cavitating_venturi_downstream_pressure(
    mass_flow: f32,
    venturi: Venturi,
    density: f32,
    vapor_pressure: f32,
) -> f32 {
    let velocity_term = mass_flow / (venturi.throat_area * venturi.cd);
    velocity_term * velocity_term / (2.0 * GRAVITY_FT_S2 * INCHES_PER_FOOT * density)
        + vapor_pressure
}

/// Valve flow coefficient from the subcritical-orifice relation:
/// CV = Q_gpm * sqrt(SG / dP), expanded into stand units.
///
/// The upstream-minus-downstream difference is NOT guarded against going
/// negative; a negative difference puts a negative value under the square
/// root and yields NaN. Known open question, deliberately not patched
/// here (see DESIGN.md).
pub fn subcritical_cv(
    mass_flow: f32,
    upstream_pressure: f32,
    downstream_pressure: f32,
    density: f32,
) -> f32 {
    let pressure_delta = upstream_pressure - downstream_pressure;
    mass_flow
        * IN3_TO_GAL
        * PER_SEC_TO_PER_MIN
        * (1.0 / (pressure_delta * density * DENSITY_WATER)).sqrt()
}

/// LOX valve angle (degrees) from flow coefficient, clamped table lookup.
pub fn lox_valve_angle(cv: f32) -> f32 {
    LOX_CV_ANGLE.interpolate(cv)
}

/// IPA valve angle (degrees) from flow coefficient, clamped table lookup.
pub fn ipa_valve_angle(cv: f32) -> f32 {
    IPA_CV_ANGLE.interpolate(cv)
}

/// Estimate mass flow (lbm/s) across a venturi from its differential
/// pressure. Telemetry only; a negative differential is floored at zero
/// here because a no-flow reading is the honest answer for one.
pub fn estimate_mass_flow(line: &FluidLine, venturi: Venturi, density: f32) -> f32 {
    let pressure_delta = line.venturi_differential_pressure().max(0.0);
    let area_term = (venturi.throat_area / venturi.inlet_area).powi(2);
    venturi.throat_area
        * (2.0 * density * pressure_delta * INCHES_PER_FOOT * GRAVITY_FT_S2 / (1.0 - area_term))
            .sqrt()
        * venturi.cd
}

fn angles_for(
    mdot_ox: f32,
    mdot_ipa: f32,
    lox_upstream: f32,
    ipa_upstream: f32,
    lox_temperature: f32,
) -> ValveAngles {
    let rho_ox = ox_density(lox_temperature);
    let rho_ipa = ipa_density();

    let ox_downstream = cavitating_venturi_downstream_pressure(
        mdot_ox,
        OX_VENTURI,
        rho_ox,
        ox_vapor_pressure(lox_temperature),
    );
    let ipa_downstream = cavitating_venturi_downstream_pressure(
        mdot_ipa,
        IPA_VENTURI,
        rho_ipa,
        ipa_vapor_pressure(),
    );

    ValveAngles {
        lox: lox_valve_angle(subcritical_cv(mdot_ox, lox_upstream, ox_downstream, rho_ox)),
        ipa: ipa_valve_angle(subcritical_cv(
            mdot_ipa,
            ipa_upstream,
            ipa_downstream,
            rho_ipa,
        )),
    }
}

/// Open-loop thrust control against live sensor conditions.
pub fn open_loop_thrust_control(thrust: f32, sd: &SensorSnapshot) -> (ValveAngles, ModelState) {
    let total = mass_flow_rate(chamber_pressure(thrust));
    let (mdot_ox, mdot_ipa) = mass_balance(total);

    let angles = angles_for(
        mdot_ox,
        mdot_ipa,
        sd.lox.valve_upstream_pressure(),
        sd.ipa.valve_upstream_pressure(),
        sd.lox.valve_temperature,
    );

    let state = ModelState {
        ol_lox_mdot: mdot_ox,
        ol_ipa_mdot: mdot_ipa,
        measured_lox_mdot: estimate_mass_flow(
            &sd.lox,
            OX_VENTURI,
            ox_density(sd.lox.venturi_temperature),
        ),
        measured_ipa_mdot: estimate_mass_flow(&sd.ipa, IPA_VENTURI, ipa_density()),
        ol_lox_angle: angles.lox,
        ol_ipa_angle: angles.ipa,
    };
    (angles, state)
}

/// Open-loop thrust control against configured default fluid conditions
/// (the active path when live conditions are not trusted).
pub fn open_loop_thrust_control_defaults(
    thrust: f32,
    defaults: &DefaultConditions,
) -> (ValveAngles, ModelState) {
    let total = mass_flow_rate(chamber_pressure(thrust));
    let (mdot_ox, mdot_ipa) = mass_balance(total);

    let angles = angles_for(
        mdot_ox,
        mdot_ipa,
        defaults.lox_upstream_pressure,
        defaults.ipa_upstream_pressure,
        defaults.lox_temperature,
    );

    let state = ModelState {
        ol_lox_mdot: mdot_ox,
        ol_ipa_mdot: mdot_ipa,
        measured_lox_mdot: 0.0,
        measured_ipa_mdot: 0.0,
        ol_lox_angle: angles.lox,
        ol_ipa_angle: angles.ipa,
    };
    (angles, state)
}

/// Closed-loop thrust control: the open-loop pipeline plus PI trims on
/// chamber pressure and per-valve mass flow. Dormant path; the commission
/// gains leave it equivalent to open-loop until the chamber and angle
/// controllers are tuned.
pub fn closed_loop_thrust_control(
    thrust: f32,
    sd: &SensorSnapshot,
    bank: &mut crate::pi::ClosedLoopBank,
    now: std::time::Instant,
) -> (ValveAngles, ModelState) {
    let pc_target = chamber_pressure(thrust);
    let pc_trim = bank
        .chamber_pressure
        .compute(pc_target - sd.chamber_pressure, now);
    let total = mass_flow_rate(pc_target + pc_trim);
    let (mdot_ox, mdot_ipa) = mass_balance(total);

    let ol = angles_for(
        mdot_ox,
        mdot_ipa,
        sd.lox.valve_upstream_pressure(),
        sd.ipa.valve_upstream_pressure(),
        sd.lox.valve_temperature,
    );

    let measured_lox = estimate_mass_flow(&sd.lox, OX_VENTURI, ox_density(sd.lox.venturi_temperature));
    let measured_ipa = estimate_mass_flow(&sd.ipa, IPA_VENTURI, ipa_density());

    let lox_trim = bank.lox_angle.compute(mdot_ox - measured_lox, now);
    let ipa_trim = bank.ipa_angle.compute(mdot_ipa - measured_ipa, now);

    let angles = ValveAngles {
        lox: (ol.lox + lox_trim).clamp(0.0, 90.0),
        ipa: (ol.ipa + ipa_trim).clamp(0.0, 90.0),
    };

    let state = ModelState {
        ol_lox_mdot: mdot_ox,
        ol_ipa_mdot: mdot_ipa,
        measured_lox_mdot: measured_lox,
        measured_ipa_mdot: measured_ipa,
        ol_lox_angle: ol.lox,
        ol_ipa_angle: ol.ipa,
    };
    (angles, state)
}
