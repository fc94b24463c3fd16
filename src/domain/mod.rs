/// Domain models for the application
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Camera as attached to a single photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Never sourced from upstream; always 0 on adapted records
    pub id: i64,
    pub name: String,
    pub rover_id: i64,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rover {
    pub id: i64,
    pub name: String,
    pub landing_date: String,
    pub launch_date: String,
    pub status: String,
    pub max_sol: i64,
    pub max_date: String,
    /// Not populated by the adapters
    pub total_photos: i64,
    /// Not populated per photo
    pub cameras: Vec<Camera>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub sol: i64,
    pub camera: Camera,
    pub img_src: String,
    /// Empty when the source has no earth date
    pub earth_date: String,
    pub rover: Rover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoverName {
    Perseverance,
    Curiosity,
    Opportunity,
    Spirit,
}

impl RoverName {
    pub const ALL: [RoverName; 4] = [
        RoverName::Perseverance,
        RoverName::Curiosity,
        RoverName::Opportunity,
        RoverName::Spirit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoverName::Perseverance => "perseverance",
            RoverName::Curiosity => "curiosity",
            RoverName::Opportunity => "opportunity",
            RoverName::Spirit => "spirit",
        }
    }

    /// Mars Exploration Rovers, served from the PDS archive
    pub fn is_mer(&self) -> bool {
        matches!(self, RoverName::Opportunity | RoverName::Spirit)
    }

    pub fn profile(&self) -> &'static RoverProfile {
        match self {
            RoverName::Perseverance => &PERSEVERANCE,
            RoverName::Curiosity => &CURIOSITY,
            RoverName::Opportunity => &OPPORTUNITY,
            RoverName::Spirit => &SPIRIT,
        }
    }

    pub fn cameras(&self) -> &'static [CameraSpec] {
        match self {
            RoverName::Perseverance => PERSEVERANCE_CAMERAS,
            RoverName::Curiosity => CURIOSITY_CAMERAS,
            RoverName::Opportunity | RoverName::Spirit => MER_CATALOG_CAMERAS,
        }
    }

    /// Rover record attached to every photo from this rover
    pub fn rover_record(&self) -> Rover {
        let p = self.profile();
        Rover {
            id: p.id,
            name: p.display_name.to_string(),
            landing_date: p.landing_date.to_string(),
            launch_date: p.launch_date.to_string(),
            status: if p.active { "active" } else { "complete" }.to_string(),
            max_sol: p.final_max_sol.unwrap_or(0),
            max_date: p.final_max_date.unwrap_or_default().to_string(),
            total_photos: 0,
            cameras: Vec::new(),
        }
    }
}

impl fmt::Display for RoverName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoverName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "perseverance" => Ok(RoverName::Perseverance),
            "curiosity" => Ok(RoverName::Curiosity),
            "opportunity" => Ok(RoverName::Opportunity),
            "spirit" => Ok(RoverName::Spirit),
            _ => Err(s.to_string()),
        }
    }
}

/// Static per-rover metadata
#[derive(Debug)]
pub struct RoverProfile {
    pub id: i64,
    pub display_name: &'static str,
    pub landing_date: &'static str,
    pub launch_date: &'static str,
    pub active: bool,
    pub date_range: &'static str,
    /// Known for missions that have ended
    pub final_max_sol: Option<i64>,
    pub final_max_date: Option<&'static str>,
    /// Used when the latest sol cannot be derived from the live feed
    pub fallback_max_sol: i64,
}

static PERSEVERANCE: RoverProfile = RoverProfile {
    id: 5,
    display_name: "Perseverance",
    landing_date: "2021-02-18",
    launch_date: "2020-07-30",
    active: true,
    date_range: "Feb 2021 - Present",
    final_max_sol: None,
    final_max_date: None,
    fallback_max_sol: 1400,
};

static CURIOSITY: RoverProfile = RoverProfile {
    id: 4,
    display_name: "Curiosity",
    landing_date: "2012-08-06",
    launch_date: "2011-11-26",
    active: true,
    date_range: "Aug 2012 - Present",
    final_max_sol: None,
    final_max_date: None,
    fallback_max_sol: 4100,
};

static OPPORTUNITY: RoverProfile = RoverProfile {
    id: 1,
    display_name: "Opportunity",
    landing_date: "2004-01-25",
    launch_date: "2003-07-07",
    active: false,
    date_range: "Jan 2004 - Jun 2018",
    final_max_sol: Some(5111),
    final_max_date: Some("2018-06-10"),
    fallback_max_sol: 5111,
};

static SPIRIT: RoverProfile = RoverProfile {
    id: 2,
    display_name: "Spirit",
    landing_date: "2004-01-04",
    launch_date: "2003-06-10",
    active: false,
    date_range: "Jan 2004 - Mar 2010",
    final_max_sol: Some(2208),
    final_max_date: Some("2010-03-22"),
    fallback_max_sol: 2208,
};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CameraSpec {
    pub abbrev: &'static str,
    pub full_name: &'static str,
}

const fn cam(abbrev: &'static str, full_name: &'static str) -> CameraSpec {
    CameraSpec { abbrev, full_name }
}

static PERSEVERANCE_CAMERAS: &[CameraSpec] = &[
    cam("EDL_RUCAM", "Rover Up-Look Camera"),
    cam("EDL_RDCAM", "Rover Down-Look Camera"),
    cam("EDL_DDCAM", "Descent Stage Down-Look Camera"),
    cam("EDL_PUCAM1", "Parachute Up-Look Camera A"),
    cam("EDL_PUCAM2", "Parachute Up-Look Camera B"),
    cam("NAVCAM_LEFT", "Navigation Camera - Left"),
    cam("NAVCAM_RIGHT", "Navigation Camera - Right"),
    cam("MCZ_LEFT", "Mast Camera Zoom - Left"),
    cam("MCZ_RIGHT", "Mast Camera Zoom - Right"),
    cam("FRONT_HAZCAM_LEFT_A", "Front Hazard Avoidance Camera - Left"),
    cam("FRONT_HAZCAM_RIGHT_A", "Front Hazard Avoidance Camera - Right"),
    cam("REAR_HAZCAM_LEFT", "Rear Hazard Avoidance Camera - Left"),
    cam("REAR_HAZCAM_RIGHT", "Rear Hazard Avoidance Camera - Right"),
    cam("SKYCAM", "MEDA Skycam"),
    cam("SHERLOC_WATSON", "SHERLOC WATSON Camera"),
];

static CURIOSITY_CAMERAS: &[CameraSpec] = &[
    cam("FHAZ", "Front Hazard Avoidance Camera"),
    cam("RHAZ", "Rear Hazard Avoidance Camera"),
    cam("MAST", "Mast Camera"),
    cam("CHEMCAM", "Chemistry and Camera Complex"),
    cam("MAHLI", "Mars Hand Lens Imager"),
    cam("MARDI", "Mars Descent Imager"),
    cam("NAVCAM", "Navigation Camera"),
];

static MER_CATALOG_CAMERAS: &[CameraSpec] = &[
    cam("FHAZ", "Front Hazard Avoidance Camera"),
    cam("RHAZ", "Rear Hazard Avoidance Camera"),
    cam("NAVCAM", "Navigation Camera"),
    cam("PANCAM", "Panoramic Camera"),
    cam("MINITES", "Miniature Thermal Emission Spectrometer"),
];

/// Search term the raw-image feeds index a camera under
pub fn camera_search_term(camera: &str) -> &str {
    match camera {
        "NAVCAM" => "NAV",
        other => other,
    }
}

/// Cameras with a browse directory in the MER archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerCamera {
    Pancam,
    Navcam,
    Fhaz,
    Rhaz,
}

impl MerCamera {
    /// Unknown names fall back to PANCAM
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "NAVCAM" => MerCamera::Navcam,
            "FHAZ" => MerCamera::Fhaz,
            "RHAZ" => MerCamera::Rhaz,
            _ => MerCamera::Pancam,
        }
    }

    pub fn abbrev(&self) -> &'static str {
        match self {
            MerCamera::Pancam => "PANCAM",
            MerCamera::Navcam => "NAVCAM",
            MerCamera::Fhaz => "FHAZ",
            MerCamera::Rhaz => "RHAZ",
        }
    }

    /// Archive directory code
    pub fn dir_code(&self) -> &'static str {
        match self {
            MerCamera::Pancam => "po",
            MerCamera::Navcam => "no",
            MerCamera::Fhaz => "ho",
            MerCamera::Rhaz => "mo",
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            MerCamera::Pancam => "Panoramic Camera",
            MerCamera::Navcam => "Navigation Camera",
            MerCamera::Fhaz => "Front Hazard Avoidance Camera",
            MerCamera::Rhaz => "Rear Hazard Avoidance Camera",
        }
    }
}

/// Filters accepted by the rover photo adapter
#[derive(Debug, Clone, Default)]
pub struct PhotoQuery {
    pub sol: Option<u32>,
    pub sol_min: Option<u32>,
    pub sol_max: Option<u32>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub camera: Option<String>,
    pub search: Option<String>,
    /// Zero-based
    pub page: u32,
}

#[derive(Debug, Serialize)]
pub struct PhotosResponse {
    pub photos: Vec<Photo>,
}

#[derive(Debug, Serialize)]
pub struct LatestPhotosResponse {
    pub latest_photos: Vec<Photo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoverInfo {
    pub max_sol: i64,
}

/// One page of MER archive photos
#[derive(Debug, Default, Serialize)]
pub struct MerPage {
    pub photos: Vec<Photo>,
    pub total: usize,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Rover catalog entry served to the front end
#[derive(Debug, Serialize)]
pub struct RoverSummary {
    pub name: RoverName,
    #[serde(rename = "displayName")]
    pub display_name: &'static str,
    pub active: bool,
    #[serde(rename = "dateRange")]
    pub date_range: &'static str,
    pub cameras: &'static [CameraSpec],
}

impl From<RoverName> for RoverSummary {
    fn from(rover: RoverName) -> Self {
        let p = rover.profile();
        Self {
            name: rover,
            display_name: p.display_name,
            active: p.active,
            date_range: p.date_range,
            cameras: rover.cameras(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpicCollection {
    Natural,
    Enhanced,
}

impl EpicCollection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpicCollection::Natural => "natural",
            EpicCollection::Enhanced => "enhanced",
        }
    }
}

impl FromStr for EpicCollection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "natural" => Ok(EpicCollection::Natural),
            "enhanced" => Ok(EpicCollection::Enhanced),
            other => Err(format!("Unknown EPIC collection: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub lat: f64,
    pub lon: f64,
}

/// Simplified EPIC record for display
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicPhoto {
    pub id: String,
    pub caption: String,
    pub date: String,
    pub image_url: String,
    pub thumbnail_url: String,
    pub centroid: Centroid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicCollections {
    pub natural_images: Vec<EpicPhoto>,
    pub enhanced_images: Vec<EpicPhoto>,
}

#[derive(Debug, Serialize)]
pub struct EpicDates {
    pub collection: &'static str,
    pub dates: Vec<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rover_name_parse() {
        assert_eq!("Spirit".parse::<RoverName>(), Ok(RoverName::Spirit));
        assert_eq!(
            "curiosity".parse::<RoverName>(),
            Ok(RoverName::Curiosity)
        );
        assert!("sojourner".parse::<RoverName>().is_err());
    }

    #[test]
    fn test_rover_record_for_retired_rover() {
        let rover = RoverName::Spirit.rover_record();
        assert_eq!(rover.id, 2);
        assert_eq!(rover.status, "complete");
        assert_eq!(rover.max_sol, 2208);
        assert_eq!(rover.max_date, "2010-03-22");
        assert_eq!(rover.total_photos, 0);
        assert!(rover.cameras.is_empty());
    }

    #[test]
    fn test_rover_record_for_active_rover() {
        let rover = RoverName::Perseverance.rover_record();
        assert_eq!(rover.id, 5);
        assert_eq!(rover.status, "active");
        assert_eq!(rover.max_sol, 0);
        assert_eq!(rover.max_date, "");
    }

    #[test]
    fn test_camera_search_term() {
        assert_eq!(camera_search_term("NAVCAM"), "NAV");
        assert_eq!(camera_search_term("MAHLI"), "MAHLI");
        assert_eq!(camera_search_term("SOMETHING_ELSE"), "SOMETHING_ELSE");
    }

    #[test]
    fn test_mer_camera_fallback() {
        assert_eq!(MerCamera::resolve("navcam"), MerCamera::Navcam);
        assert_eq!(MerCamera::resolve("MINITES"), MerCamera::Pancam);
        assert_eq!(MerCamera::resolve(""), MerCamera::Pancam);
        assert_eq!(MerCamera::Rhaz.dir_code(), "mo");
    }

    #[test]
    fn test_mer_page_serializes_has_more() {
        let page = MerPage::default();
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["hasMore"], false);
        assert_eq!(json["total"], 0);
    }

    #[test]
    fn test_epic_collection_parse() {
        assert_eq!(
            "enhanced".parse::<EpicCollection>(),
            Ok(EpicCollection::Enhanced)
        );
        assert!("aerosol".parse::<EpicCollection>().is_err());
    }
}
