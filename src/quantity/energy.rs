use crate::quantity::{cost::Cost, rate::KilowattHourRate};

quantity!(KilowattHours, "kWh");

implement_mul!(KilowattHours, KilowattHourRate, Cost);
