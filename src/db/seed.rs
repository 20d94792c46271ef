use rusqlite::params;
use std::path::Path;

use crate::state::DbPool;

struct DemoUser {
    name: &'static str,
    email: &'static str,
    bio: &'static str,
}

struct DemoListing {
    owner: &'static str,
    title: &'static str,
    description: &'static str,
    price: f64,
    image: &'static str,
    category: &'static str,
    gender: &'static str,
    condition: &'static str,
    color: &'static str,
    size: &'static str,
}

const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        name: "Avery Lane",
        email: "avery@example.edu",
        bio: "Hi, I'm Avery! I love thrifting and finding unique pieces around campus.",
    },
    DemoUser {
        name: "Jordan Reyes",
        email: "jordan@example.edu",
        bio: "Yo I'm Jordan. Selling what no longer sparks joy.",
    },
];

const DEMO_LISTINGS: &[DemoListing] = &[
    DemoListing {
        owner: "avery@example.edu",
        title: "Denim Jacket",
        description: "A rugged denim jacket perfect for layering.",
        price: 59.7,
        image: "demo-item-1.jpg",
        category: "Jackets",
        gender: "Unisex",
        condition: "Good",
        color: "Blue",
        size: "M",
    },
    DemoListing {
        owner: "avery@example.edu",
        title: "Band T-Shirt",
        description: "Classic t-shirt with a vintage band print.",
        price: 24.87,
        image: "demo-item-2.jpg",
        category: "Tops",
        gender: "Male",
        condition: "Excellent",
        color: "Black",
        size: "L",
    },
    DemoListing {
        owner: "avery@example.edu",
        title: "Cargo Pants",
        description: "Nice cargo pants with plenty of pockets.",
        price: 39.5,
        image: "demo-item-3.jpg",
        category: "Bottoms",
        gender: "Female",
        condition: "Fair",
        color: "Green",
        size: "S",
    },
    DemoListing {
        owner: "avery@example.edu",
        title: "White Sneakers",
        description: "Well-worn pair of white court sneakers.",
        price: 50.0,
        image: "demo-item-4.jpg",
        category: "Shoes",
        gender: "Unisex",
        condition: "Good",
        color: "White",
        size: "10",
    },
    DemoListing {
        owner: "jordan@example.edu",
        title: "Basketball Hat",
        description: "Purple basketball hat.",
        price: 14.0,
        image: "demo-item-5.jpg",
        category: "Hats",
        gender: "Unisex",
        condition: "Good",
        color: "Purple",
        size: "",
    },
    DemoListing {
        owner: "jordan@example.edu",
        title: "Leather Belt",
        description: "Leather belt with an embossed design.",
        price: 19.99,
        image: "demo-item-6.jpg",
        category: "Accessories",
        gender: "Male",
        condition: "Excellent",
        color: "Black",
        size: "",
    },
    DemoListing {
        owner: "jordan@example.edu",
        title: "Tote Bag",
        description: "Tote bag with an anime print.",
        price: 15.99,
        image: "demo-item-7.jpg",
        category: "Misc",
        gender: "Unisex",
        condition: "Excellent",
        color: "Brown",
        size: "",
    },
    DemoListing {
        owner: "jordan@example.edu",
        title: "Baggy Jeans",
        description: "Trendy baggy jeans for a casual look.",
        price: 30.99,
        image: "demo-item-8.jpg",
        category: "Bottoms",
        gender: "Female",
        condition: "Fair",
        color: "Blue",
        size: "",
    },
];

/// Insert demo users and listings. Skipped entirely when any user already
/// exists, so it is safe to pass --seed on every start. Listings whose image
/// file is missing from `images_dir` are skipped with a warning, matching
/// how incomplete demo assets should degrade.
pub fn run(pool: &DbPool, images_dir: &Path) -> anyhow::Result<()> {
    let conn = pool.get()?;

    let user_count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    if user_count > 0 {
        tracing::info!("Skipping seed: users already exist");
        return Ok(());
    }

    for user in DEMO_USERS {
        conn.execute(
            "INSERT INTO users (name, email, bio) VALUES (?1, ?2, ?3)",
            params![user.name, user.email, user.bio],
        )?;
    }

    let mut inserted = 0usize;
    for listing in DEMO_LISTINGS {
        let image_path = images_dir.join(listing.image);
        let picture_data = match std::fs::read(&image_path) {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!(
                    "Skipping demo listing '{}': image not found at {}",
                    listing.title,
                    image_path.display()
                );
                continue;
            }
        };

        conn.execute(
            "INSERT INTO item_listings
               (user_id, title, description, price, color, size, gender, condition, category, picture_data)
             VALUES ((SELECT id FROM users WHERE email = ?1), ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                listing.owner,
                listing.title,
                listing.description,
                listing.price,
                listing.color,
                listing.size,
                listing.gender,
                listing.condition,
                listing.category,
                picture_data,
            ],
        )?;
        inserted += 1;
    }

    tracing::info!(
        "Seeded {} demo users and {} demo listings",
        DEMO_USERS.len(),
        inserted
    );
    Ok(())
}
