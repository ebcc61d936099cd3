use std::ops::Div;

use crate::quantity::{energy::KilowattHours, time::Hours};

quantity!(Kilowatts, "kW");

implement_mul!(Kilowatts, Hours, KilowattHours);

impl Div<Hours> for KilowattHours {
    type Output = Kilowatts;

    fn div(self, hours: Hours) -> Self::Output {
        Kilowatts(self.0 / hours.0)
    }
}

impl Div<Kilowatts> for KilowattHours {
    type Output = Hours;

    fn div(self, power: Kilowatts) -> Self::Output {
        Hours(self.0 / power.0)
    }
}
