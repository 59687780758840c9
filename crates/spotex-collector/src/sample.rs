/// Label names of the spot price family, in [`LabelKey`] order.
pub const PRICE_LABELS: [&str; 4] = ["region", "az", "product", "instance_type"];

/// One spot price observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSample {
    pub region: String,
    pub availability_zone: String,
    pub product: String,
    pub instance_type: String,
    /// US dollars per hour.
    pub price: f64,
}

impl PriceSample {
    pub fn label_key(&self) -> LabelKey {
        LabelKey {
            region: self.region.clone(),
            availability_zone: self.availability_zone.clone(),
            product: self.product.clone(),
            instance_type: self.instance_type.clone(),
        }
    }
}

/// Identity of one exported price series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelKey {
    pub region: String,
    pub availability_zone: String,
    pub product: String,
    pub instance_type: String,
}

impl LabelKey {
    pub fn label_values(&self) -> [&str; 4] {
        [
            self.region.as_str(),
            self.availability_zone.as_str(),
            self.product.as_str(),
            self.instance_type.as_str(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_key_follows_label_order() {
        let sample = PriceSample {
            region: "eu-west-1".to_string(),
            availability_zone: "eu-west-1a".to_string(),
            product: "Linux/UNIX".to_string(),
            instance_type: "t3.micro".to_string(),
            price: 0.0123,
        };

        let key = sample.label_key();
        assert_eq!(
            key.label_values(),
            ["eu-west-1", "eu-west-1a", "Linux/UNIX", "t3.micro"]
        );
        assert_eq!(PRICE_LABELS, ["region", "az", "product", "instance_type"]);
    }
}
