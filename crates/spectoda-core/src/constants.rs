//! Protocol flag tables
//!
//! Values are fixed protocol constants shared with controller firmware.

/// TNGL bytecode flags emitted by the compiler
pub mod tngl {
    /// Placeholder, also used as a string terminator
    pub const NONE: u8 = 0;

    /* drawings */
    pub const DRAWING_SET: u8 = 1;
    pub const DRAWING_ADD: u8 = 2;
    pub const DRAWING_SUB: u8 = 3;
    pub const DRAWING_SCALE: u8 = 4;
    pub const DRAWING_FILTER: u8 = 5;

    /* layers */
    pub const LAYER_SET: u8 = 6;
    pub const LAYER_ADD: u8 = 7;
    pub const LAYER_SUB: u8 = 8;
    pub const LAYER_SCALE: u8 = 9;
    pub const LAYER_FILTER: u8 = 10;

    pub const SCOPE: u8 = 11;

    /* sifters */
    pub const SIFTER_SEGMENT: u8 = 13;
    pub const SIFTER_CANVAS: u8 = 14;
    pub const SIFTER_GROUP: u8 = 15;

    /* event handlers */
    pub const INTERACTIVE: u8 = 16;
    pub const EVENT_CATCHER: u8 = 17;

    /* scoped definitions */
    pub const DECLARE_VARIABLE: u8 = 18;

    /* global definitions */
    pub const DEFINE_CONTROLLER: u8 = 24;
    pub const DEFINE_SEGMENT: u8 = 25;
    pub const DEFINE_CANVAS: u8 = 26;
    pub const DEFINE_MARKS: u8 = 27;
    pub const DEFINE_ANIMATION: u8 = 28;
    pub const DEFINE_EMITTER: u8 = 29;

    /* animations */
    pub const ANIMATION_NONE: u8 = 32;
    pub const ANIMATION_FILL: u8 = 33;
    pub const ANIMATION_RAINBOW: u8 = 34;
    pub const ANIMATION_FADE: u8 = 35;
    pub const ANIMATION_PROJECTILE: u8 = 36;
    pub const ANIMATION_LOADING: u8 = 37;
    pub const ANIMATION_COLOR_ROLL: u8 = 38;
    pub const ANIMATION_COLOR_GRADIENT3: u8 = 39;
    pub const ANIMATION_COLOR_GRADIENT5: u8 = 40;
    pub const ANIMATION_COLOR_GRADIENT2: u8 = 41;
    pub const ANIMATION_COLOR_GRADIENT4: u8 = 42;
    pub const ANIMATION_INL_ANI: u8 = 126;
    pub const ANIMATION_DEFINED: u8 = 127;

    /* modifiers */
    pub const MODIFIER_BRIGHTNESS: u8 = 128;
    pub const MODIFIER_TIMELINE: u8 = 129;
    pub const MODIFIER_FADE_IN: u8 = 130;
    pub const MODIFIER_FADE_OUT: u8 = 131;
    pub const MODIFIER_SWITCH_COLORS: u8 = 132;
    pub const MODIFIER_TIME_LOOP: u8 = 133;
    pub const MODIFIER_TIME_SCALE: u8 = 134;
    pub const MODIFIER_TIME_SCALE_SMOOTHED: u8 = 135;
    pub const MODIFIER_TIME_CHANGE: u8 = 136;
    pub const MODIFIER_TIME_SET: u8 = 137;

    /* event generators */
    pub const GENERATOR_LAST_EVENT_VALUE: u8 = 144;
    pub const GENERATOR_SMOOTHOUT: u8 = 145;
    pub const GENERATOR_LAG_VALUE: u8 = 146;

    /* generators */
    pub const GENERATOR_SINE: u8 = 150;
    pub const GENERATOR_SAW: u8 = 151;
    pub const GENERATOR_TRIANGLE: u8 = 152;
    pub const GENERATOR_SQUARE: u8 = 153;
    pub const GENERATOR_PERLIN_NOISE: u8 = 154;

    /* variable operations */
    pub const VARIABLE_READ: u8 = 160;
    pub const VARIABLE_ADD: u8 = 161;
    pub const VARIABLE_SUB: u8 = 162;
    pub const VARIABLE_MUL: u8 = 163;
    pub const VARIABLE_DIV: u8 = 164;
    pub const VARIABLE_MOD: u8 = 165;
    pub const VARIABLE_SCALE: u8 = 166;
    pub const VARIABLE_MAP: u8 = 167;

    /* objects */
    pub const CONTROLLER: u8 = 176;
    pub const SEGMENT: u8 = 177;
    pub const SLICE: u8 = 178;
    pub const PORT: u8 = 179;
    pub const CANVAS: u8 = 180;
    pub const MARKS: u8 = 181;

    /* event operations */
    pub const EVENT_SET_VALUE: u8 = 184;
    pub const EVENT_EMIT_LOCAL: u8 = 185;
    pub const EVENT_RANDOM_CHOICE: u8 = 186;

    /* values */
    pub const VALUE_ADDRESS: u8 = 187;
    pub const TIMESTAMP: u8 = 188;
    pub const COLOR: u8 = 189;
    pub const PERCENTAGE: u8 = 190;
    pub const LABEL: u8 = 191;
    pub const PIXELS: u8 = 192;
    pub const TUPLE: u8 = 193;
    pub const STRING: u8 = 202;
    pub const CHAR: u8 = 203;
    pub const BYTE: u8 = 204;

    /* most used constants */
    pub const TIMESTAMP_ZERO: u8 = 194;
    pub const TIMESTAMP_MAX: u8 = 195;
    pub const TIMESTAMP_MIN: u8 = 196;
    pub const COLOR_WHITE: u8 = 197;
    pub const COLOR_BLACK: u8 = 198;
    pub const PERCENTAGE_ZERO: u8 = 199;
    pub const PERCENTAGE_MAX: u8 = 200;
    pub const PERCENTAGE_MIN: u8 = 201;

    /* terminators */
    pub const END_OF_SCOPE: u8 = 254;
    pub const END_OF_TNGL_BYTES: u8 = 255;
}

/// Command frame flags and request/response pairs
pub mod command {
    /* legacy OTA framing */
    pub const OTA_WRITE: u8 = 0;
    pub const OTA_RESET: u8 = 253;
    pub const OTA_END: u8 = 254;
    pub const OTA_BEGIN: u8 = 255;

    pub const DEVICE_REBOOT_REQUEST: u8 = 5;

    pub const CONFIG_UPDATE_REQUEST: u8 = 10;
    pub const CONFIG_UPDATE_RESPONSE: u8 = 11;

    pub const PEER_CONNECTED: u8 = 101;
    pub const PEER_DISCONNECTED: u8 = 102;

    /// 6-byte clock, 1 reserved byte, 4-byte length, payload
    pub const TNGL_BYTES: u8 = 104;
    /// 6-byte clock, 4-byte signed timeline, 1-byte flags
    pub const SET_TIMELINE: u8 = 105;

    pub const EMIT_EVENT: u8 = 111;
    pub const EMIT_TIMESTAMP_EVENT: u8 = 112;
    pub const EMIT_COLOR_EVENT: u8 = 113;
    pub const EMIT_PERCENTAGE_EVENT: u8 = 114;
    pub const EMIT_LABEL_EVENT: u8 = 115;

    pub const CONNECTED_PEERS_INFO_REQUEST: u8 = 210;
    pub const CONNECTED_PEERS_INFO_RESPONSE: u8 = 211;
    pub const DEVICE_CONFIG_REQUEST: u8 = 212;
    pub const DEVICE_CONFIG_RESPONSE: u8 = 213;
    pub const FW_VERSION_REQUEST: u8 = 216;
    pub const FW_VERSION_RESPONSE: u8 = 217;

    pub const ADOPT_REQUEST: u8 = 240;
    pub const ADOPT_RESPONSE: u8 = 241;
    pub const TNGL_FINGERPRINT_REQUEST: u8 = 242;
    pub const TNGL_FINGERPRINT_RESPONSE: u8 = 243;

    /// Bit of the set-timeline flags byte marking a paused timeline
    pub const TIMELINE_PAUSED_BIT: u8 = 1 << 4;

    /// Response flag expected for a request flag
    pub fn response_flag(request: u8) -> Option<u8> {
        match request {
            CONFIG_UPDATE_REQUEST => Some(CONFIG_UPDATE_RESPONSE),
            CONNECTED_PEERS_INFO_REQUEST => Some(CONNECTED_PEERS_INFO_RESPONSE),
            DEVICE_CONFIG_REQUEST => Some(DEVICE_CONFIG_RESPONSE),
            FW_VERSION_REQUEST => Some(FW_VERSION_RESPONSE),
            ADOPT_REQUEST => Some(ADOPT_RESPONSE),
            TNGL_FINGERPRINT_REQUEST => Some(TNGL_FINGERPRINT_RESPONSE),
            _ => None,
        }
    }
}
