use itertools::Itertools;

/// Gap-filling policy for interval series.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Interpolation {
    /// Straight line between the nearest known neighbours.
    ///
    /// Leading gaps take the first known value, trailing gaps take the last one.
    Linear,

    /// Hold the previous known value, back-filling only the leading gap.
    Step,
}

pub trait FillGaps {
    /// Fill missing values in place.
    ///
    /// A series without a single known value is left untouched.
    fn fill_gaps(&mut self, interpolation: Interpolation);
}

impl FillGaps for [Option<f64>] {
    #[expect(clippy::cast_precision_loss)]
    fn fill_gaps(&mut self, interpolation: Interpolation) {
        let known = self
            .iter()
            .enumerate()
            .filter_map(|(index, value)| value.map(|value| (index, value)))
            .collect_vec();
        let (Some(&(first_index, first_value)), Some(&(last_index, last_value))) =
            (known.first(), known.last())
        else {
            return;
        };

        self[..first_index].fill(Some(first_value));
        self[last_index + 1..].fill(Some(last_value));

        for ((from_index, from_value), (to_index, to_value)) in known.into_iter().tuple_windows() {
            let span = (to_index - from_index) as f64;
            for index in from_index + 1..to_index {
                self[index] = Some(match interpolation {
                    Interpolation::Linear => {
                        from_value + (to_value - from_value) * (index - from_index) as f64 / span
                    }
                    Interpolation::Step => from_value,
                });
            }
        }
    }
}
