//! Protocol vocabulary.
//!
//! Per-joint actions come in families of three tags: the single-joint form,
//! the all-joints form (`s` suffix) and the explicit-group form (`g` suffix).

use crate::Tag;

// Opcodes.
pub const SET: Tag = Tag::new("set");
pub const GET: Tag = Tag::new("get");
pub const OK: Tag = Tag::new("ok");
pub const FAIL: Tag = Tag::new("fail");
pub const CALIBRATE_AXIS: Tag = Tag::new("calb");
pub const CALIBRATION_PARAMS: Tag = Tag::new("clbp");
pub const CALIBRATION_DONE: Tag = Tag::new("cald");
pub const ABORT_CALIBRATION: Tag = Tag::new("abc");
pub const ABORT_PARK: Tag = Tag::new("abp");

// Interfaces addressed by the modern framing at position 1.
pub const TORQUE: Tag = Tag::new("torq");
pub const CONTROL_MODE: Tag = Tag::new("icmd");
pub const IMPEDANCE: Tag = Tag::new("impd");
pub const INTERACTION_MODE: Tag = Tag::new("intm");
pub const PROTOCOL_VERSION: Tag = Tag::new("prtv");
pub const REMOTE_CALIBRATOR: Tag = Tag::new("reca");
pub const REMOTE_VARIABLES: Tag = Tag::new("rvar");
pub const CURRENT: Tag = Tag::new("icur");
pub const PWM: Tag = Tag::new("ipwm");
pub const PID: Tag = Tag::new("pid");

pub const INTERFACES: [Tag; 10] = [
    TORQUE,
    CONTROL_MODE,
    IMPEDANCE,
    INTERACTION_MODE,
    PROTOCOL_VERSION,
    REMOTE_CALIBRATOR,
    REMOTE_VARIABLES,
    CURRENT,
    PWM,
    PID,
];

pub fn is_interface(tag: Tag) -> bool {
    INTERFACES.contains(&tag)
}

/// Reported by `get prtv`.
pub const PROTOCOL_VERSION_NUMBER: (i64, i64, i64) = (1, 6, 0);

/// How many joints a family member addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    One,
    All,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Family {
    pub one: Tag,
    pub all: Tag,
    pub group: Tag,
}

impl Family {
    pub const fn new(one: &str, all: &str, group: &str) -> Self {
        Self {
            one: Tag::new(one),
            all: Tag::new(all),
            group: Tag::new(group),
        }
    }

    pub fn scope(&self, tag: Tag) -> Option<Scope> {
        if tag == self.one {
            Some(Scope::One)
        } else if tag == self.all {
            Some(Scope::All)
        } else if tag == self.group {
            Some(Scope::Group)
        } else {
            None
        }
    }
}

// Legacy set/get families.
pub const POSITION: Family = Family::new("pos", "poss", "posg");
pub const RELATIVE: Family = Family::new("rel", "rels", "relg");
pub const POSITION_DIRECT: Family = Family::new("pdi", "pdis", "pdig");
pub const VELOCITY_MOVE: Family = Family::new("vmo", "vmos", "vmog");
pub const REF_SPEED: Family = Family::new("spd", "spds", "spdg");
pub const REF_ACCELERATION: Family = Family::new("acc", "accs", "accg");
pub const STOP: Family = Family::new("stp", "stps", "stpg");
pub const MOTION_DONE: Family = Family::new("don", "dons", "dong");
pub const ENCODER: Family = Family::new("enc", "encs", "encg");
pub const ENCODER_SPEED: Family = Family::new("esp", "esps", "espg");
pub const ENCODER_ACCELERATION: Family = Family::new("eac", "eacs", "eacg");
pub const ENCODER_RESET: Family = Family::new("rst", "rsts", "rstg");
pub const MOTOR_ENCODER: Family = Family::new("men", "mens", "meng");
pub const MOTOR_ENCODER_SPEED: Family = Family::new("msp", "msps", "mspg");
pub const MOTOR_ENCODER_ACCELERATION: Family = Family::new("mac", "macs", "macg");
pub const MOTOR_ENCODER_RESET: Family = Family::new("mrs", "mrss", "mrsg");
pub const COUNTS_PER_REVOLUTION: Family = Family::new("cpr", "cprs", "cprg");
pub const AMP_ENABLE: Family = Family::new("aen", "aens", "aeng");
pub const AMP_DISABLE: Family = Family::new("adi", "adis", "adig");
pub const AMP_STATUS: Family = Family::new("ast", "asts", "astg");
pub const AMP_MAX_CURRENT: Family = Family::new("amx", "amxs", "amxg");
pub const AMP_NOMINAL_CURRENT: Family = Family::new("anm", "anms", "anmg");
pub const AMP_PEAK_CURRENT: Family = Family::new("apk", "apks", "apkg");
pub const AMP_PWM_LIMIT: Family = Family::new("apw", "apws", "apwg");
pub const AMP_SUPPLY_VOLTAGE: Family = Family::new("avl", "avls", "avlg");

// Legacy single-form actions.
pub const LIMITS: Tag = Tag::new("lim");
pub const VELOCITY_LIMITS: Tag = Tag::new("vlim");
pub const AXIS_NAME: Tag = Tag::new("name");
pub const JOINT_TYPE: Tag = Tag::new("jtyp");
pub const AXES: Tag = Tag::new("axes");
pub const MOTOR_ENCODER_COUNT: Tag = Tag::new("mnum");
pub const LAST_INPUT_STAMP: Tag = Tag::new("lstm");

// Modern actions.
pub const REFERENCE: Family = Family::new("ref", "refs", "refg");
pub const MEASURED_TORQUE: Family = Family::new("trq", "trqs", "trqg");
pub const MEASURED_CURRENT: Family = Family::new("cur", "curs", "curg");
pub const MEASURED_DUTY: Family = Family::new("pwm", "pwms", "pwmg");
pub const MODE: Family = Family::new("mod", "mods", "modg");
pub const RANGE: Tag = Tag::new("rng");
pub const MOTOR_TORQUE_PARAMS: Tag = Tag::new("mtps");
pub const IMPEDANCE_PARAMS: Tag = Tag::new("par");
pub const IMPEDANCE_OFFSET: Tag = Tag::new("off");

pub const CALIBRATE: Family = Family::new("cal", "cals", "calg");
pub const HOMING: Family = Family::new("hom", "homs", "homg");
pub const PARK: Family = Family::new("prk", "prks", "prkg");
pub const QUIT_CALIBRATE: Tag = Tag::new("qcal");
pub const QUIT_PARK: Tag = Tag::new("qprk");
pub const AVAILABLE: Tag = Tag::new("avai");

pub const VARIABLE_KEYS: Tag = Tag::new("keys");
pub const VARIABLE: Tag = Tag::new("var");

pub const PID_PARAMS: Family = Family::new("pid", "pids", "pidg");
pub const PID_REFERENCE: Family = Family::new("ref", "refs", "refg");
pub const PID_ERROR_LIMIT: Family = Family::new("lim", "lims", "limg");
pub const PID_ERROR: Family = Family::new("err", "errs", "errg");
pub const PID_OUTPUT: Family = Family::new("out", "outs", "outg");
pub const PID_OFFSET: Tag = Tag::new("off");
pub const PID_ENABLE: Tag = Tag::new("ena");
pub const PID_DISABLE: Tag = Tag::new("dis");
pub const PID_RESET: Tag = Tag::new("rst");
pub const PID_ENABLED: Tag = Tag::new("isen");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_scope() {
        assert_eq!(POSITION.scope(Tag::new("pos")), Some(Scope::One));
        assert_eq!(POSITION.scope(Tag::new("poss")), Some(Scope::All));
        assert_eq!(POSITION.scope(Tag::new("posg")), Some(Scope::Group));
        assert_eq!(POSITION.scope(Tag::new("vmo")), None);
    }

    #[test]
    fn test_set_and_get_are_not_interfaces() {
        assert!(is_interface(TORQUE));
        assert!(!is_interface(SET));
        assert!(!is_interface(POSITION.one));
    }
}
