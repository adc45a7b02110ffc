//! Serde helpers for duration fields expressed in milliseconds

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

pub(crate) mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::duration_millis")]
        delay: Duration,
        #[serde(with = "super::option_duration_millis")]
        timeout: Option<Duration>,
    }

    #[test]
    fn test_round_trip() {
        let sample = Sample {
            delay: Duration::from_millis(1500),
            timeout: Some(Duration::from_millis(250)),
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"delay":1500,"timeout":250}"#);

        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back.delay, Duration::from_millis(1500));
        assert_eq!(back.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_missing_timeout() {
        let back: Sample = serde_json::from_str(r#"{"delay":0,"timeout":null}"#).unwrap();
        assert_eq!(back.timeout, None);
    }
}
