// BRIGHTNESSD -- DISPLAY BACKLIGHT CONTROL SERVICE
// ONE PHYSICAL BACKLIGHT, TWO MODES:
//   MANUAL: CALLER-DRIVEN LEVELS, SMOOTHLY RAMPED
//   AUTO:   AMBIENT-LIGHT DRIVEN, FILTERED AND CURVE-MAPPED
//
// ALL CONTROL LOGIC RUNS ON ONE LOOP THREAD. CLIENTS POST TYPED
// COMMANDS OVER A BOUNDED QUEUE; SENSOR PRODUCERS FEED A TOPIC BUS.

pub mod logger;

pub mod abc;
pub mod controller;
pub mod device;
pub mod display;
pub mod error;
pub mod levels;
pub mod lightsensor;
pub mod persist;
pub mod service;
pub mod spline;
pub mod writelog;
