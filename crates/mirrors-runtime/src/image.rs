use mirrors_schema::RepoKind;

/// Build recipe for the image a sync job runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRecipe {
    pub tag: &'static str,
    pub dockerfile: &'static str,
}

const APT_DOCKERFILE: &str = "\
FROM ubuntu:latest
ENV DEBIAN_FRONTEND=noninteractive
RUN apt-get update && \\
    apt-get install -y apt-mirror debmirror gnupg wget curl rsync ca-certificates && \\
    rm -rf /var/lib/apt/lists/*
WORKDIR /mirror
";

const YUM_DOCKERFILE: &str = "\
FROM rockylinux:9
RUN dnf install -y dnf-plugins-core dnf-utils createrepo_c wget curl rsync gnupg2 && \\
    dnf clean all
WORKDIR /mirror
";

/// One image per repository kind; every target of a kind shares it.
pub fn recipe_for(kind: RepoKind) -> ImageRecipe {
    match kind {
        RepoKind::Apt => ImageRecipe {
            tag: "linux-mirrors-apt:latest",
            dockerfile: APT_DOCKERFILE,
        },
        RepoKind::Yum => ImageRecipe {
            tag: "linux-mirrors-yum:latest",
            dockerfile: YUM_DOCKERFILE,
        },
    }
}
